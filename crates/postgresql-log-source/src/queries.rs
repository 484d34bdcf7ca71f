//! SQL issued against the ReportPortal `log` and `test_item` tables.

pub const SELECT_LAST_LOG_TIME: &str = "SELECT MAX(log_time) FROM log";

const LOG_COLUMNS: &str = "l.id, l.log_time, l.log_message, l.item_id";

/// Logs that carry their launch directly.
///
/// With `bounded`, `$1` is the inclusive lower bound on `log_time`.
pub fn logs_with_launch(bounded: bool) -> String {
    let mut sql = format!(
        "SELECT {LOG_COLUMNS}, l.launch_id, l.project_id FROM log l \
         WHERE l.launch_id IS NOT NULL"
    );
    if bounded {
        sql.push_str(" AND l.log_time >= $1");
    }
    sql.push_str(" ORDER BY l.log_time");
    sql
}

/// Item logs, with the launch taken from the item or, for a retry, from the
/// item it retries.
///
/// `$1` is the array of candidate launch ids. With `bounded`, `$2` is the
/// inclusive lower bound on `log_time`, applied to direct and retried items
/// alike.
pub fn logs_resolved_through_items(bounded: bool) -> String {
    let launch = "COALESCE(ti.launch_id, origin.launch_id)";
    let mut sql = format!(
        "SELECT {LOG_COLUMNS}, {launch} AS launch_id, l.project_id FROM log l \
         JOIN test_item ti ON ti.item_id = l.item_id \
         LEFT JOIN test_item origin ON origin.item_id = ti.retry_of \
         WHERE l.launch_id IS NULL AND {launch} = ANY($1)"
    );
    if bounded {
        sql.push_str(" AND l.log_time >= $2");
    }
    sql.push_str(" ORDER BY l.log_time");
    sql
}
