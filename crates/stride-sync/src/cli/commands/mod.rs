pub mod backups;
pub mod summary;
pub mod sync;
pub mod verify;

pub use backups::{list as list_backups, restore as restore_backup};
pub use summary::{monthly, weekly};
pub use sync::{enrich, run as sync_run, status, SourceSelection};
pub use verify::verify;

use serde::Serialize;

use crate::error::Result;

/// Print a value as pretty JSON on stdout
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncate a string to a maximum display width
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
