//! Picks which failure to propagate when several futures fail together.
//!
//! A real error typically causes a hard interruption of the scheduler, which
//! in turn fails every other in-flight future. The caller wants the original
//! error, not the interruptions it triggered.

use hs_types::{SearchResult, Severity};

use crate::future::TaskFuture;

/// Wait for every future, then return the most important failure, if any.
///
/// `importance` lists severities from most to least important. Among failures
/// whose severity appears in the list, the one with the lowest index wins;
/// ties go to the earlier future. If no failure is ranked by the list, the
/// first failing future in iteration order is propagated.
pub fn reraise_most_important<T: Clone>(
    futures: &[TaskFuture<T>],
    importance: &[Severity],
) -> SearchResult<()> {
    let mut most_important = None;

    for future in futures {
        let Err(error) = future.result() else {
            continue;
        };
        let Some(rank) = importance.iter().position(|s| *s == error.severity()) else {
            continue;
        };
        match &most_important {
            Some((best_rank, _)) if *best_rank <= rank => {}
            _ => most_important = Some((rank, error)),
        }
    }

    if let Some((_, error)) = most_important {
        return Err(error);
    }

    for future in futures {
        future.result()?;
    }
    Ok(())
}
