//! Scripted oracle used by pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Oracle, OracleError};

/// Replies from a queue; once drained, repeats `fallback`.
pub struct FakeOracle {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl FakeOracle {
    pub fn always(reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies; `Err` entries simulate transport failures.
    pub fn scripted(replies: Vec<Result<&str, &str>>, fallback: &str) -> Self {
        let queue = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self {
            replies: Mutex::new(queue),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for FakeOracle {
    async fn complete(&self, prompt: &str, _max_output_tokens: u32) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(OracleError::Api {
                kind: "overloaded_error".to_string(),
                message,
            }),
            None => Ok(self.fallback.clone()),
        }
    }
}

pub const BUG_REPLY: &str = r#"{
  "type": "bug",
  "impact": "High",
  "severity": "Major",
  "modules": ["flow-server"],
  "good_first_issue": false,
  "confidence": 0.85,
  "reasoning": "Regression in routing",
  "triage": {
    "needs_test_case": true,
    "ai_fixable": false,
    "potentially_fixed": false,
    "potentially_outdated": false,
    "triage_notes": "No reproduction project"
  }
}"#;

pub const ENHANCEMENT_REPLY: &str = r#"```json
{"type": "enhancement", "impact": null, "severity": null, "modules": [], "good_first_issue": true, "confidence": 0.7, "reasoning": "Small API addition", "triage": null}
```"#;
