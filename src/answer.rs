//! Grounded answer generation.
//!
//! Hands retrieval output to the Gemini `generateAnswer` API as
//! grounding passages and assembles the user-facing response: answer
//! text plus the cited sources. The model call is opaque — this module
//! only owns the request/response shapes and the provenance plumbing.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{AnswerConfig, Config};
use crate::db;
use crate::models::RetrievedChunk;
use crate::retrieve;

/// Styles the answer service can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerStyle {
    AnswerStyleUnspecified,
    Abstractive,
    Extractive,
    Verbose,
}

impl AnswerStyle {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "unspecified" => Ok(Self::AnswerStyleUnspecified),
            "abstractive" => Ok(Self::Abstractive),
            "extractive" => Ok(Self::Extractive),
            "verbose" => Ok(Self::Verbose),
            other => bail!(
                "Unknown answer style: '{}'. Use unspecified, abstractive, extractive, or verbose.",
                other
            ),
        }
    }
}

/// A cited source accompanying an answer.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerSource {
    pub text: String,
    pub url: String,
}

/// The user-facing response shape.
#[derive(Debug, Clone, Serialize)]
pub struct GroundedAnswer {
    pub id: String,
    pub answer: String,
    pub sources: Vec<AnswerSource>,
    pub sender: String,
    pub timestamp: String,
}

// ============ generateAnswer request/response ============

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct GroundingPassage {
    id: String,
    content: Content,
}

#[derive(Serialize)]
struct GroundingPassages {
    passages: Vec<GroundingPassage>,
}

#[derive(Serialize)]
struct GenerateAnswerRequest {
    contents: Vec<Content>,
    #[serde(rename = "answerStyle")]
    answer_style: AnswerStyle,
    #[serde(rename = "inlinePassages")]
    passages: GroundingPassages,
    temperature: f64,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct GenerateAnswerResponse {
    answer: Candidate,
}

/// Call the answer service with the query and its grounding passages.
pub async fn generate_answer(
    config: &AnswerConfig,
    query: &str,
    passages: &[RetrievedChunk],
) -> Result<String> {
    let api_key =
        std::env::var("GEMINI_API_KEY").map_err(|_| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

    let style = AnswerStyle::parse(&config.style)?;

    let grounding = passages
        .iter()
        .enumerate()
        .map(|(i, chunk)| GroundingPassage {
            id: i.to_string(),
            content: Content {
                parts: vec![Part {
                    text: chunk.text.clone(),
                }],
            },
        })
        .collect();

    let request = GenerateAnswerRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: query.to_string(),
            }],
        }],
        answer_style: style,
        passages: GroundingPassages { passages: grounding },
        temperature: config.temperature,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/{}:generateAnswer?key={}",
        config.model, api_key
    );

    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
        .context("Failed to reach answer service")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Answer API error {}: {}", status, body);
    }

    let parsed: GenerateAnswerResponse = response
        .json()
        .await
        .context("Invalid answer service response")?;

    Ok(parsed
        .answer
        .content
        .parts
        .first()
        .map(|p| p.text.clone())
        .unwrap_or_else(|| "Unable to generate answer".to_string()))
}

/// Retrieve grounding chunks for `query` and generate an answer.
pub async fn answer_query(
    config: &Config,
    pool: &sqlx::SqlitePool,
    query: &str,
    limit: usize,
) -> Result<GroundedAnswer> {
    let chunks = retrieve::retrieve_for_query(config, pool, query, limit).await?;
    tracing::info!(passages = chunks.len(), "generating grounded answer");

    let answer = generate_answer(&config.answer, query, &chunks).await?;

    let sources = chunks
        .into_iter()
        .map(|chunk| AnswerSource {
            text: chunk.text,
            url: chunk.source_url,
        })
        .collect();

    Ok(GroundedAnswer {
        id: uuid::Uuid::new_v4().to_string(),
        answer,
        sources,
        sender: "bot".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// CLI entry: ask a question and print the grounded answer.
pub async fn run_ask(config: &Config, query: &str) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }
    if !config.embedding.is_enabled() {
        bail!("Asking requires embeddings. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let grounded = answer_query(config, &pool, query, 10).await?;

    println!("{}", grounded.answer);
    println!();
    println!("Sources:");
    for source in &grounded.sources {
        println!("  - {}", source.url);
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_styles() {
        assert_eq!(AnswerStyle::parse("verbose").unwrap(), AnswerStyle::Verbose);
        assert_eq!(
            AnswerStyle::parse("Extractive").unwrap(),
            AnswerStyle::Extractive
        );
        assert!(AnswerStyle::parse("poetic").is_err());
    }

    #[test]
    fn style_serializes_to_api_names() {
        assert_eq!(
            serde_json::to_string(&AnswerStyle::Verbose).unwrap(),
            "\"VERBOSE\""
        );
        assert_eq!(
            serde_json::to_string(&AnswerStyle::AnswerStyleUnspecified).unwrap(),
            "\"ANSWER_STYLE_UNSPECIFIED\""
        );
    }
}
