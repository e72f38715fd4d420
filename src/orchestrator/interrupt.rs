//! Operator interaction during an interrupt.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::Result;
use crate::log_router::sinks::print_line;

/// Source of operator answers while the run is paused
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// Show `question` and wait for a single line of input
    async fn ask(&self, question: &str) -> Result<String>;
}

/// Reads one line from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        print_line(question)?;
        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line)
    }
}

/// Replays a fixed list of answers; answers the empty string once exhausted
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions shown so far
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        self.asked.lock().push(question.to_string());
        Ok(self.answers.lock().pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_prompt_replays_answers() {
        let prompt = ScriptedPrompt::new(["n", "y"]);
        assert_eq!(prompt.ask("q1").await.unwrap(), "n");
        assert_eq!(prompt.ask("q2").await.unwrap(), "y");
        assert_eq!(prompt.ask("q3").await.unwrap(), "");
        assert_eq!(prompt.asked(), vec!["q1", "q2", "q3"]);
    }
}
