//! Line-oriented answers for the `fill` command.
//!
//! Answers passed with `--answer key=value` are used first; anything else is
//! asked on stdin.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use leadflow_engine::leadflow_types::{FieldKind, FormField};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, stdin, stdout};

/// What the user typed for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Value(String),
    Back,
    Quit,
}

pub struct Prompt {
    prefilled: HashMap<String, String>,
    interactive: bool,
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    pub fn new(prefilled: HashMap<String, String>, interactive: bool) -> Self {
        Self {
            prefilled,
            interactive,
            lines: BufReader::new(stdin()).lines(),
        }
    }

    pub async fn ask(&mut self, field: &FormField) -> Result<Reply> {
        if let Some(value) = self.prefilled.remove(field.key().as_str()) {
            return Ok(Reply::Value(value));
        }
        if !self.interactive {
            return Ok(Reply::Value(String::new()));
        }

        let marker = if field.is_required() { " *" } else { "" };
        let mut text = format!("{}{marker}", field.label());
        if let FieldKind::Select { options } | FieldKind::Radio { options } = field.kind() {
            for (index, option) in options.iter().enumerate() {
                text.push_str(&format!("\n  {}) {option}", index + 1));
            }
        }
        text.push_str("\n> ");

        let line = self.read_line(&text).await?;
        Ok(match line.trim() {
            ":back" => Reply::Back,
            ":quit" => Reply::Quit,
            other => Reply::Value(resolve_option(field.kind(), other)),
        })
    }

    pub async fn confirm(&mut self, question: &str) -> Result<bool> {
        if !self.interactive {
            return Ok(false);
        }
        let line = self.read_line(&format!("{question} [y/N] ")).await?;
        Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    async fn read_line(&mut self, prompt: &str) -> Result<String> {
        let mut out = stdout();
        out.write_all(prompt.as_bytes()).await?;
        out.flush().await?;
        match self
            .lines
            .next_line()
            .await
            .context("failed to read from stdin")?
        {
            Some(line) => Ok(line),
            None => bail!("stdin closed"),
        }
    }
}

/// Accept either an option's number or its text.
fn resolve_option(kind: &FieldKind, input: &str) -> String {
    let options = kind.options();
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| options.get(index))
        .cloned()
        .unwrap_or_else(|| input.to_string())
}

/// Parse `key=value` pairs from `--answer`.
pub fn parse_answer(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
