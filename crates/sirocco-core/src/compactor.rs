//! Transcript compaction: summarize the head, keep the tail verbatim.

use std::sync::Arc;

use sirocco_llm::{LlmError, Message, Summarizer};
use sirocco_tools::{AuditEvent, AuditLogger};

use crate::history::HistoryLog;
use crate::meter::TokenMeter;

/// What a compaction attempt did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Below threshold or too little head to compact. Log untouched.
    Skipped,
    /// Candidate was not smaller than the original. Log untouched.
    Discarded { before: usize, after: usize },
    /// Candidate replaced the log.
    Committed { before: usize, after: usize },
}

pub struct HistoryCompactor<M> {
    meter: M,
    threshold: usize,
    keep_last: usize,
    audit_logger: Option<Arc<AuditLogger>>,
}

impl<M: TokenMeter> HistoryCompactor<M> {
    pub fn new(meter: M, threshold: usize, keep_last: usize) -> Self {
        Self {
            meter,
            threshold,
            keep_last,
            audit_logger: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    /// Compact the log if it prices over the threshold.
    ///
    /// The protected tail is carried over byte-identical and in order.
    /// A candidate that fails to shrink the total is discarded, so a
    /// commit always strictly reduces the priced size.
    ///
    /// # Errors
    ///
    /// Returns the summarizer error, with the log left unchanged.
    pub async fn maybe_compact<S: Summarizer>(
        &self,
        task: &str,
        log: &mut HistoryLog,
        summarizer: &S,
    ) -> Result<CompactionOutcome, LlmError> {
        let before = log.total_tokens(&self.meter);
        if before <= self.threshold {
            return Ok(CompactionOutcome::Skipped);
        }
        if self.keep_last >= log.len() || log.len() - self.keep_last <= 2 {
            tracing::debug!(
                len = log.len(),
                keep_last = self.keep_last,
                "over threshold but head too small to compact"
            );
            return Ok(CompactionOutcome::Skipped);
        }

        let messages_before = log.len();
        let (head, tail) = log.split_tail(self.keep_last);
        let tail: Vec<Message> = tail.to_vec();
        let mut candidate = summarizer.summarize_messages(task, head).await?;
        candidate.extend(tail);

        let after: usize = candidate
            .iter()
            .map(|m| self.meter.count(&m.content))
            .sum();
        if after >= before {
            tracing::debug!(before, after, "compaction candidate not smaller, discarding");
            return Ok(CompactionOutcome::Discarded { before, after });
        }

        let messages_after = candidate.len();
        log.replace(candidate);

        if let Some(ref logger) = self.audit_logger {
            logger
                .log(&AuditEvent::HistoryCompression {
                    tokens_before: before,
                    tokens_after: after,
                    messages_before,
                    messages_after,
                    keep_last: self.keep_last,
                    threshold: self.threshold,
                })
                .await;
        }
        tracing::info!(before, after, messages_before, messages_after, "history compacted");

        Ok(CompactionOutcome::Committed { before, after })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::HeuristicMeter;
    use sirocco_llm::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Summarizer that replaces any segment with one message of fixed size.
    struct FixedSummarizer {
        content: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedSummarizer {
        fn of_chars(n: usize) -> Self {
            Self {
                content: "s".repeat(n),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                content: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    impl Summarizer for FixedSummarizer {
        async fn summarize_messages(
            &self,
            _task: &str,
            _messages: &[Message],
        ) -> Result<Vec<Message>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::Other("summarizer down".into()));
            }
            Ok(vec![Message::new(Role::System, self.content.clone())])
        }

        async fn summarize_tool_output(
            &self,
            _tool_name: &str,
            _arguments: &str,
            _raw: &str,
        ) -> Result<String, LlmError> {
            Ok(self.content.clone())
        }
    }

    /// Ten messages of 120 chars (30 tokens) each: 300 tokens total.
    fn heavy_log() -> HistoryLog {
        HistoryLog::from_messages(
            (0..10)
                .map(|i| Message::new(Role::User, format!("{i}{}", "m".repeat(119))))
                .collect(),
        )
    }

    fn compactor(threshold: usize, keep_last: usize) -> HistoryCompactor<HeuristicMeter> {
        HistoryCompactor::new(HeuristicMeter, threshold, keep_last)
    }

    #[tokio::test]
    async fn under_threshold_is_a_noop() {
        let mut log = heavy_log();
        let original = log.clone();
        let summarizer = FixedSummarizer::of_chars(4);
        let outcome = compactor(1000, 5)
            .maybe_compact("task", &mut log, &summarizer)
            .await
            .expect("compact");
        assert_eq!(outcome, CompactionOutcome::Skipped);
        assert_eq!(log, original);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn commit_replaces_head_and_keeps_tail_identical() {
        let mut log = heavy_log();
        let expected_tail: Vec<Message> = log.messages()[5..].to_vec();
        let outcome = compactor(100, 5)
            .maybe_compact("task", &mut log, &FixedSummarizer::of_chars(40))
            .await
            .expect("compact");

        // summary 10 tokens + tail 150 tokens, down from 300
        assert_eq!(
            outcome,
            CompactionOutcome::Committed {
                before: 300,
                after: 160
            }
        );
        assert_eq!(log.len(), 6);
        assert_eq!(&log.messages()[1..], expected_tail.as_slice());
        assert_eq!(log.messages()[0].role, Role::System);
    }

    #[tokio::test]
    async fn unhelpful_summary_is_discarded() {
        let mut log = heavy_log();
        let original = log.clone();
        // Summary alone prices above the original 300 tokens.
        let outcome = compactor(100, 5)
            .maybe_compact("task", &mut log, &FixedSummarizer::of_chars(1300))
            .await
            .expect("compact");
        assert!(matches!(outcome, CompactionOutcome::Discarded { before: 300, .. }));
        assert_eq!(log, original);
    }

    #[tokio::test]
    async fn equal_size_candidate_is_discarded() {
        let mut log = heavy_log();
        let original = log.clone();
        // 600 chars = 150 tokens, plus the 150-token tail: exactly the original size.
        let outcome = compactor(100, 5)
            .maybe_compact("task", &mut log, &FixedSummarizer::of_chars(600))
            .await
            .expect("compact");
        assert!(matches!(outcome, CompactionOutcome::Discarded { .. }));
        assert_eq!(log, original);
    }

    #[tokio::test]
    async fn tail_larger_than_log_skips() {
        let mut log = heavy_log();
        let summarizer = FixedSummarizer::of_chars(4);
        let outcome = compactor(100, 20)
            .maybe_compact("task", &mut log, &summarizer)
            .await
            .expect("compact");
        assert_eq!(outcome, CompactionOutcome::Skipped);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tiny_head_skips() {
        // 10 messages, keep 8: only 2 head messages, not worth a summary call.
        let mut log = heavy_log();
        let summarizer = FixedSummarizer::of_chars(4);
        let outcome = compactor(100, 8)
            .maybe_compact("task", &mut log, &summarizer)
            .await
            .expect("compact");
        assert_eq!(outcome, CompactionOutcome::Skipped);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn summarizer_failure_leaves_log_unchanged() {
        let mut log = heavy_log();
        let original = log.clone();
        let result = compactor(100, 5)
            .maybe_compact("task", &mut log, &FixedSummarizer::failing())
            .await;
        assert!(result.is_err());
        assert_eq!(log, original);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            /// A committed compaction always strictly shrinks the priced log.
            #[test]
            fn commit_strictly_shrinks(
                lens in proptest::collection::vec(1usize..400, 4..30),
                summary_chars in 1usize..2000,
                keep_last in 0usize..10,
                threshold in 1usize..500,
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .expect("runtime");
                rt.block_on(async {
                    let mut log = HistoryLog::from_messages(
                        lens.iter()
                            .map(|n| Message::new(Role::User, "c".repeat(*n)))
                            .collect(),
                    );
                    let original = log.clone();
                    let before_total = log.total_tokens(&HeuristicMeter);
                    let outcome = compactor(threshold, keep_last)
                        .maybe_compact("task", &mut log, &FixedSummarizer::of_chars(summary_chars))
                        .await
                        .expect("compact");

                    match outcome {
                        CompactionOutcome::Committed { before, after } => {
                            prop_assert_eq!(before, before_total);
                            prop_assert!(after < before);
                            prop_assert_eq!(log.total_tokens(&HeuristicMeter), after);
                            // Tail survives byte-identical.
                            let (_, tail) = original.split_tail(keep_last);
                            let kept = &log.messages()[log.len() - tail.len()..];
                            prop_assert_eq!(kept, tail);
                        }
                        CompactionOutcome::Skipped | CompactionOutcome::Discarded { .. } => {
                            prop_assert_eq!(&log, &original);
                        }
                    }
                    Ok(())
                })?;
            }
        }
    }
}
