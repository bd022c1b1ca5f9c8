//! Lazy row streams
//!
//! Three pull-based iteration strategies over one query:
//!
//! | Stream | Item | Store round trips |
//! |--------|------|-------------------|
//! | [`CursorStream`] | one `Record` | one query, one cursor advanced per pull |
//! | [`BatchStream`] | `Vec<Record>` | one `LIMIT/OFFSET` query per batch on one connection |
//! | [`LazyPaginator`] | `Vec<Record>` | one connection and query per page |
//!
//! 모든 스트림은 단일 소비자, 전진 전용이며 재시작할 수 없습니다.
//! Dropping a stream early releases its connection without reading further.

pub mod batch;
pub mod cursor;
pub mod paginate;

pub use batch::{BatchStream, open_batch_stream};
pub use cursor::{CursorStream, open_cursor_stream};
pub use paginate::{LazyPaginator, lazy_paginate, lazy_paginate_from, paginate};

use crate::error::{FlowError, FlowResult};

/// Strips trailing whitespace and `;` so a window clause can be appended.
fn base_query(query: &str) -> FlowResult<String> {
    let trimmed = query.trim().trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        return Err(FlowError::InvalidArgument("query is empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn window_query(base: &str, limit: usize, offset: usize) -> String {
    format!("{base} LIMIT {limit} OFFSET {offset}")
}

fn check_size(name: &str, size: usize) -> FlowResult<()> {
    if size == 0 {
        return Err(FlowError::InvalidArgument(format!(
            "{name} must be positive"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_query_trims_terminator() {
        assert_eq!(
            base_query("SELECT * FROM users ;\n").unwrap(),
            "SELECT * FROM users"
        );
        assert!(matches!(
            base_query(" ; "),
            Err(FlowError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_window_query() {
        assert_eq!(
            window_query("SELECT * FROM users", 10, 20),
            "SELECT * FROM users LIMIT 10 OFFSET 20"
        );
    }
}
