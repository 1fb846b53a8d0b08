use std::error::Error as StdError;
use std::fmt;

/// Marker cause placed in the chain when a [`crate::step::Step`] is cancelled and a
/// callback observes it through the shared cancellation token. Grounded on the
/// original `context.Canceled` check in `benchmark.go` (`ctx.Err() != nil`).
#[derive(Debug, Default)]
pub struct Canceled;

impl fmt::Display for Canceled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation canceled")
    }
}

impl StdError for Canceled {}

fn chain_any(err: &(dyn StdError + 'static), pred: impl Fn(&(dyn StdError + 'static)) -> bool) -> bool {
    let mut cur = Some(err);
    while let Some(e) = cur {
        if pred(e) {
            return true;
        }
        cur = e.source();
    }
    false
}

pub(super) fn is_canceled(err: &(dyn StdError + 'static)) -> bool {
    chain_any(err, |e| e.downcast_ref::<Canceled>().is_some())
}

pub(super) fn is_deadline_exceeded(err: &(dyn StdError + 'static)) -> bool {
    chain_any(err, |e| {
        e.downcast_ref::<tokio::time::error::Elapsed>().is_some()
    })
}

pub(super) fn is_network_timeout(err: &(dyn StdError + 'static)) -> bool {
    chain_any(err, |e| {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return io.kind() == std::io::ErrorKind::TimedOut;
        }
        if let Some(re) = e.downcast_ref::<reqwest::Error>() {
            return re.is_timeout();
        }
        false
    })
}

pub(super) fn is_network_temporary(err: &(dyn StdError + 'static)) -> bool {
    chain_any(err, |e| {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            );
        }
        if let Some(re) = e.downcast_ref::<reqwest::Error>() {
            return re.is_connect();
        }
        false
    })
}
