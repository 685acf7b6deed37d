//! Verification helpers for dispatcher tests
//!
//! Checks recorded applies for serialization and aggregate-document shape

use crate::recording::ApplyRecord;
use std::collections::HashMap;
use thiserror::Error;
use vr_types::ConfigItem;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Applies on {target} overlap: '{first}' still running when '{second}' started")]
    Overlap {
        target: String,
        first: String,
        second: String,
    },

    #[error("Fragment '{fragment}' not found in aggregate document")]
    FragmentMissing { fragment: String },

    #[error("Fragment '{later}' appears before '{earlier}'")]
    OutOfOrder { earlier: String, later: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Checks that applies for each target never overlapped in time.
pub fn assert_serialized(records: &[ApplyRecord]) -> VerifyResult<()> {
    let mut by_target: HashMap<&str, Vec<&ApplyRecord>> = HashMap::new();
    for record in records {
        by_target.entry(record.target.as_str()).or_default().push(record);
    }

    for (target, mut applies) in by_target {
        applies.sort_by_key(|r| r.started);
        for pair in applies.windows(2) {
            if pair[1].started < pair[0].finished {
                return Err(VerificationError::Overlap {
                    target: target.to_string(),
                    first: pair[0].item.description(),
                    second: pair[1].item.description(),
                });
            }
        }
    }
    Ok(())
}

/// Checks that every fragment occurs in `document`, in the given order.
pub fn assert_fragments_in_order(document: &str, fragments: &[&str]) -> VerifyResult<()> {
    let mut last: Option<(usize, &str)> = None;
    for &fragment in fragments {
        let pos = document
            .find(fragment)
            .ok_or_else(|| VerificationError::FragmentMissing {
                fragment: fragment.to_string(),
            })?;
        if let Some((prev_pos, prev)) = last {
            if pos < prev_pos {
                return Err(VerificationError::OutOfOrder {
                    earlier: prev.to_string(),
                    later: fragment.to_string(),
                });
            }
        }
        last = Some((pos, fragment));
    }
    Ok(())
}

/// Contents of a recorded file item.
pub fn file_contents(item: &ConfigItem) -> Option<&str> {
    match item {
        ConfigItem::File { contents, .. } => Some(contents),
        ConfigItem::Script { .. } => None,
    }
}
