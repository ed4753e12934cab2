use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

const CHUNK_SIZE: usize = 8 * 1024;

/// Byte allowance shared by the stdout and stderr readers of one run.
#[derive(Debug)]
pub(crate) struct ByteBudget {
    remaining: AtomicUsize,
}

impl ByteBudget {
    pub(crate) fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(limit),
        })
    }

    /// Reserve up to `want` bytes, returning how many were granted.
    pub(crate) fn take(&self, want: usize) -> usize {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some(cur.saturating_sub(want))
            })
            .unwrap_or_else(|cur| cur);
        previous.min(want)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub(crate) bytes: Vec<u8>,
    /// Bytes were read past the budget and discarded.
    pub(crate) overflowed: bool,
}

/// Read `reader` to EOF, keeping what the budget allows and discarding the
/// rest so the child never blocks on a full pipe. Stops early when `stop`
/// fires.
pub(crate) async fn drain<R>(
    mut reader: R,
    budget: Arc<ByteBudget>,
    stop: CancellationToken,
) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = tokio::select! {
            read = reader.read(&mut chunk) => read,
            () = stop.cancelled() => break,
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                let granted = budget.take(n);
                captured.bytes.extend_from_slice(&chunk[..granted]);
                if granted < n {
                    captured.overflowed = true;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::debug!("output pipe read failed: {e}");
                break;
            }
        }
    }
    captured
}

/// Keep the first `max_lines` lines of `text`, returning the kept text and
/// the number of lines dropped.
pub(crate) fn limit_lines(text: String, max_lines: Option<usize>) -> (String, usize) {
    let Some(max) = max_lines else {
        return (text, 0);
    };
    let mut lines = text.split_inclusive('\n');
    let kept: String = lines.by_ref().take(max).collect();
    let dropped = lines.count();
    if dropped == 0 {
        (text, 0)
    } else {
        (kept, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_shared_and_saturates() {
        let budget = ByteBudget::new(10);
        assert_eq!(budget.take(4), 4);
        assert_eq!(budget.take(4), 4);
        assert_eq!(budget.take(4), 2);
        assert_eq!(budget.take(4), 0);
    }

    #[test]
    fn limit_lines_keeps_head() {
        let (kept, dropped) = limit_lines("a\nb\nc\nd\n".into(), Some(2));
        assert_eq!(kept, "a\nb\n");
        assert_eq!(dropped, 2);
    }

    #[test]
    fn limit_lines_counts_unterminated_tail() {
        let (kept, dropped) = limit_lines("a\nb\nc".into(), Some(1));
        assert_eq!(kept, "a\n");
        assert_eq!(dropped, 2);
    }

    #[test]
    fn limit_lines_noop_when_within_limit() {
        assert_eq!(limit_lines("a\nb\n".into(), Some(2)), ("a\nb\n".into(), 0));
        assert_eq!(limit_lines("x".into(), None), ("x".into(), 0));
        assert_eq!(limit_lines(String::new(), Some(0)), (String::new(), 0));
    }

    #[tokio::test]
    async fn drain_discards_past_budget() {
        let data = vec![b'x'; 20_000];
        let budget = ByteBudget::new(100);
        let captured = drain(&data[..], budget, CancellationToken::new()).await;
        assert_eq!(captured.bytes.len(), 100);
        assert!(captured.overflowed);
    }

    #[tokio::test]
    async fn drain_within_budget_is_complete() {
        let captured = drain(
            &b"hello\n"[..],
            ByteBudget::new(1024),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(captured.bytes, b"hello\n");
        assert!(!captured.overflowed);
    }
}
