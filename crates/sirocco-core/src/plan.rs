//! Execution planning for fenced code fragments in assistant replies.
//!
//! An LLM judge classifies each fragment and proposes an execution
//! order. The judge is advisory: any failure or malformed verdict falls
//! back to executing every fragment in its original order.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;
use sirocco_llm::{LlmError, LlmProvider, Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentIntent {
    /// Installs dependencies or mutates the environment.
    EnvSetup,
    /// Runs directly for its output.
    DirectExec,
    /// Should be saved to a file and then run.
    ScriptRun,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment {
    pub index: usize,
    pub language: String,
    pub code: String,
    pub intent: FragmentIntent,
    pub target_file: Option<String>,
}

impl CodeFragment {
    #[must_use]
    pub fn new(index: usize, language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            index,
            language: language.into(),
            code: code.into(),
            intent: FragmentIntent::Other,
            target_file: None,
        }
    }
}

/// Judge verdict as returned by the LLM.
#[derive(Debug, Default, Deserialize)]
pub struct JudgeVerdict {
    #[serde(default)]
    pub blocks: Vec<FragmentVerdict>,
    #[serde(default)]
    pub order: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FragmentVerdict {
    pub index: i64,
    #[serde(default = "default_keep")]
    pub keep: bool,
    #[serde(default)]
    pub intent: Option<FragmentIntent>,
    #[serde(default)]
    pub target_file: Option<String>,
}

fn default_keep() -> bool {
    true
}

pub trait FragmentJudge: Send + Sync {
    /// Classify fragments and propose an execution order.
    ///
    /// # Errors
    ///
    /// Returns an error if the verdict cannot be obtained or parsed.
    fn judge(
        &self,
        fragments: &[CodeFragment],
    ) -> impl Future<Output = Result<JudgeVerdict, LlmError>> + Send;
}

pub struct ExecutionPlanGate<J> {
    judge: J,
}

impl<J: FragmentJudge> ExecutionPlanGate<J> {
    pub fn new(judge: J) -> Self {
        Self { judge }
    }

    /// Produce the fragments to execute, in execution order.
    pub async fn plan(&self, fragments: Vec<CodeFragment>) -> Vec<CodeFragment> {
        if fragments.is_empty() {
            return fragments;
        }
        match self.judge.judge(&fragments).await {
            Ok(verdict) => apply_verdict(fragments, &verdict),
            Err(e) => {
                tracing::warn!("fragment judge failed, keeping all fragments in order: {e}");
                fragments
            }
        }
    }
}

/// Resolve a verdict against the fragments it describes.
///
/// Out-of-range indices are dropped, duplicates keep their first
/// occurrence, and an empty `blocks` list means keep everything. An
/// explicit all-dropped verdict yields an empty plan.
fn apply_verdict(fragments: Vec<CodeFragment>, verdict: &JudgeVerdict) -> Vec<CodeFragment> {
    let len = fragments.len();
    let in_range = |i: i64| usize::try_from(i).ok().filter(|&i| i < len);

    let mut info: HashMap<usize, &FragmentVerdict> = HashMap::new();
    for block in &verdict.blocks {
        if let Some(i) = in_range(block.index) {
            info.entry(i).or_insert(block);
        }
    }

    let keep_set: HashSet<usize> = if verdict.blocks.is_empty() {
        (0..len).collect()
    } else {
        info.iter()
            .filter(|(_, v)| v.keep)
            .map(|(&i, _)| i)
            .collect()
    };

    let order: Vec<usize> = if verdict.order.is_empty() {
        (0..len).collect()
    } else {
        verdict.order.iter().filter_map(|&i| in_range(i)).collect()
    };

    let mut seen = HashSet::new();
    let mut planned = Vec::new();
    for i in order {
        if !keep_set.contains(&i) || !seen.insert(i) {
            continue;
        }
        let mut fragment = fragments[i].clone();
        if let Some(v) = info.get(&i) {
            if let Some(intent) = v.intent {
                fragment.intent = intent;
            }
            if v.target_file.is_some() {
                fragment.target_file.clone_from(&v.target_file);
            }
        }
        planned.push(fragment);
    }
    planned
}

/// Extract fenced code fragments from an assistant reply.
///
/// An unterminated fence is ignored rather than swallowing the rest of
/// the reply.
#[must_use]
pub fn extract_fragments(text: &str) -> Vec<CodeFragment> {
    let mut fragments = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(newline) = after.find('\n') else {
            break;
        };
        let language = after[..newline].trim();
        let body = &after[newline + 1..];
        let Some(end) = body.find("```") else {
            break;
        };
        let code = body[..end].trim();
        if !code.is_empty() {
            fragments.push(CodeFragment::new(fragments.len(), language, code));
        }
        rest = &body[end + 3..];
    }
    fragments
}

const JUDGE_PROMPT: &str = "You review code blocks an agent proposed to run. For each block decide \
whether it should execute, classify its intent as one of env_setup, direct_exec, script_run, or \
other, and for script_run name the target_file. Then give the execution order: environment setup \
first, then scripts, then direct commands. Skip blocks that are illustrative only. Respond with \
JSON only: {\"blocks\": [{\"index\": 0, \"keep\": true, \"intent\": \"direct_exec\", \
\"target_file\": null}], \"order\": [0]}";

pub struct LlmFragmentJudge<P> {
    provider: P,
    timeout: Duration,
}

impl<P> LlmFragmentJudge<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<P: LlmProvider> FragmentJudge for LlmFragmentJudge<P> {
    async fn judge(&self, fragments: &[CodeFragment]) -> Result<JudgeVerdict, LlmError> {
        let listing: Vec<serde_json::Value> = fragments
            .iter()
            .map(|f| {
                serde_json::json!({
                    "index": f.index,
                    "language": f.language,
                    "code": f.code,
                })
            })
            .collect();
        let request = vec![
            Message::new(Role::System, JUDGE_PROMPT),
            Message::new(
                Role::User,
                serde_json::to_string_pretty(&listing).unwrap_or_default(),
            ),
        ];

        let reply = match tokio::time::timeout(self.timeout, self.provider.chat(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(LlmError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let json = extract_json_object(&reply).ok_or_else(|| {
            LlmError::StructuredParse("judge reply contains no JSON object".into())
        })?;
        serde_json::from_str(json).map_err(|e| LlmError::StructuredParse(e.to_string()))
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments() -> Vec<CodeFragment> {
        vec![
            CodeFragment::new(0, "bash", "pip install requests"),
            CodeFragment::new(1, "python", "print('hi')"),
            CodeFragment::new(2, "bash", "ls"),
        ]
    }

    fn verdict(json: &str) -> JudgeVerdict {
        serde_json::from_str(json).expect("verdict")
    }

    #[test]
    fn extracts_fragments_with_languages() {
        let text = "intro\n```bash\necho one\n```\nmiddle\n```python\nprint(2)\n```\nend";
        let frags = extract_fragments(text);
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].language, "bash");
        assert_eq!(frags[0].code, "echo one");
        assert_eq!(frags[1].index, 1);
        assert_eq!(frags[1].language, "python");
    }

    #[test]
    fn unterminated_fence_is_ignored() {
        let frags = extract_fragments("```bash\necho one\n```\n```python\nno close");
        assert_eq!(frags.len(), 1);
    }

    #[test]
    fn plain_fence_keeps_empty_language() {
        let frags = extract_fragments("```\nsome text\n```");
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].language, "");
    }

    #[test]
    fn empty_body_fence_is_skipped() {
        assert!(extract_fragments("```bash\n\n```").is_empty());
    }

    #[test]
    fn verdict_reorders_and_drops() {
        let v = verdict(
            r#"{"blocks":[{"index":0,"keep":true,"intent":"env_setup"},
                          {"index":1,"keep":false},
                          {"index":2,"keep":true,"intent":"direct_exec"}],
                "order":[2,0]}"#,
        );
        let planned = apply_verdict(fragments(), &v);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].index, 2);
        assert_eq!(planned[0].intent, FragmentIntent::DirectExec);
        assert_eq!(planned[1].index, 0);
        assert_eq!(planned[1].intent, FragmentIntent::EnvSetup);
    }

    #[test]
    fn empty_blocks_keeps_everything_in_order() {
        let planned = apply_verdict(fragments(), &verdict(r#"{"blocks":[],"order":[]}"#));
        assert_eq!(planned.len(), 3);
        assert_eq!(planned[0].index, 0);
        assert_eq!(planned[2].index, 2);
    }

    #[test]
    fn out_of_range_and_duplicate_order_entries_are_dropped() {
        let v = verdict(r#"{"blocks":[],"order":[1,7,-2,1,0]}"#);
        let planned = apply_verdict(fragments(), &v);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].index, 1);
        assert_eq!(planned[1].index, 0);
    }

    #[test]
    fn all_dropped_verdict_yields_empty_plan() {
        let v = verdict(r#"{"blocks":[{"index":0,"keep":false},{"index":1,"keep":false},{"index":2,"keep":false}],"order":[0,1,2]}"#);
        assert!(apply_verdict(fragments(), &v).is_empty());
    }

    #[test]
    fn target_file_flows_into_fragment() {
        let v = verdict(
            r#"{"blocks":[{"index":1,"keep":true,"intent":"script_run","target_file":"run.py"}],"order":[1]}"#,
        );
        let planned = apply_verdict(fragments(), &v);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].target_file.as_deref(), Some("run.py"));
        assert_eq!(planned[0].intent, FragmentIntent::ScriptRun);
    }

    #[tokio::test]
    async fn plan_falls_back_when_judge_fails() {
        struct FailingJudge;
        impl FragmentJudge for FailingJudge {
            async fn judge(&self, _: &[CodeFragment]) -> Result<JudgeVerdict, LlmError> {
                Err(LlmError::Other("judge down".into()))
            }
        }
        let planned = ExecutionPlanGate::new(FailingJudge).plan(fragments()).await;
        assert_eq!(planned.len(), 3);
        assert_eq!(planned[0].index, 0);
    }

    #[tokio::test]
    async fn plan_of_nothing_is_nothing() {
        struct PanicJudge;
        impl FragmentJudge for PanicJudge {
            async fn judge(&self, _: &[CodeFragment]) -> Result<JudgeVerdict, LlmError> {
                unreachable!("judge must not run on an empty plan")
            }
        }
        assert!(ExecutionPlanGate::new(PanicJudge).plan(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn llm_judge_parses_fenced_verdict() {
        use sirocco_llm::mock::MockProvider;
        let provider = MockProvider::with_responses(vec![
            "Here is my verdict:\n```json\n{\"blocks\":[{\"index\":0,\"keep\":true}],\"order\":[0]}\n```".into(),
        ]);
        let judge = LlmFragmentJudge::new(provider);
        let verdict = judge.judge(&fragments()).await.expect("judge");
        assert_eq!(verdict.blocks.len(), 1);
        assert_eq!(verdict.order, vec![0]);
    }

    #[tokio::test]
    async fn llm_judge_rejects_non_json_reply() {
        use sirocco_llm::mock::MockProvider;
        let provider = MockProvider::with_responses(vec!["no json here".into()]);
        let judge = LlmFragmentJudge::new(provider);
        let result = judge.judge(&fragments()).await;
        assert!(matches!(result, Err(LlmError::StructuredParse(_))));
    }
}
