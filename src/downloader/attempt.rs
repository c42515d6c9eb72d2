// Ordered fallback - try strategy N, fall back to N+1
//
// Shared by the extraction retrier (negotiation profiles) and the media
// normalizer (remux, then re-encode). The first success short-circuits the
// sequence; when every strategy fails only the last error is kept.

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, warn};

/// Every strategy in the list failed
#[derive(Debug)]
pub enum Exhausted<E> {
    /// The strategy list was empty
    NoStrategies,
    /// All strategies were tried; `last` is the final failure
    Failed { attempts: usize, last: E },
}

/// Run `op` against each strategy in order until one succeeds.
///
/// Returns the index of the winning strategy along with its output.
pub async fn first_success<'a, S, T, E, F, Fut>(
    label: &str,
    strategies: &'a [S],
    mut op: F,
) -> Result<(usize, T), Exhausted<E>>
where
    S: Display,
    E: Display,
    F: FnMut(&'a S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last = None;

    for (idx, strategy) in strategies.iter().enumerate() {
        debug!(
            label,
            strategy = %strategy,
            attempt = idx + 1,
            total = strategies.len(),
            "trying strategy"
        );

        match op(strategy).await {
            Ok(value) => {
                debug!(label, strategy = %strategy, "strategy succeeded");
                return Ok((idx, value));
            }
            Err(e) => {
                warn!(label, strategy = %strategy, error = %e, "strategy failed");
                last = Some(e);
            }
        }
    }

    match last {
        Some(last) => Err(Exhausted::Failed {
            attempts: strategies.len(),
            last,
        }),
        None => Err(Exhausted::NoStrategies),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn first_success_short_circuits() {
        let tried = RefCell::new(Vec::new());
        let strategies = ["a", "b", "c"];

        let result = first_success("test", &strategies, |s| {
            tried.borrow_mut().push(*s);
            let outcome = if *s == "b" { Ok(s.len()) } else { Err("nope") };
            async move { outcome }
        })
        .await;

        assert!(matches!(result, Ok((1, 1))));
        assert_eq!(*tried.borrow(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn exhausted_keeps_last_error() {
        let strategies = [1, 2, 3];

        let result: Result<(usize, ()), _> =
            first_success("test", &strategies, |n| async move { Err(format!("fail {}", n)) })
                .await;

        match result {
            Err(Exhausted::Failed { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "fail 3");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_strategy_list() {
        let strategies: [u8; 0] = [];

        let result: Result<(usize, ()), Exhausted<String>> =
            first_success("test", &strategies, |_| async { Ok(()) }).await;

        assert!(matches!(result, Err(Exhausted::NoStrategies)));
    }
}
