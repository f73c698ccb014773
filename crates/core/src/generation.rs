use crate::error::PipelineError;
use crate::models::{GenerationMetadata, GenerationResult, RetrievalResult, SamplingOptions, Style};
use crate::traits::CompletionClient;
use regex::Regex;

const FALLBACK_MIN_CHARS: usize = 10;

pub struct Generator<C> {
    client: C,
    sampling: SamplingOptions,
}

impl<C: CompletionClient> Generator<C> {
    pub fn new(client: C, sampling: SamplingOptions) -> Self {
        Self { client, sampling }
    }

    pub async fn generate(
        &self,
        chunks: &[RetrievalResult],
        query_text: &str,
        max_statements: usize,
        style: Style,
    ) -> Result<GenerationResult, PipelineError> {
        if chunks.is_empty() {
            return Err(PipelineError::Input(
                "no chunks supplied for generation".to_string(),
            ));
        }
        if query_text.trim().is_empty() {
            return Err(PipelineError::Input("query text is blank".to_string()));
        }

        let system_prompt = build_system_prompt(style, max_statements);
        let user_prompt = build_user_prompt(query_text, chunks, max_statements);

        let completion = self
            .client
            .complete(&system_prompt, &user_prompt, &self.sampling)
            .await?;

        if completion.text.trim().is_empty() {
            return Err(PipelineError::UpstreamGeneration {
                details: "model returned an empty response".to_string(),
                chunk_ids: chunks.iter().map(|chunk| chunk.chunk_id).collect(),
            });
        }

        let (statements, refs) = parse_statements(&completion.text, chunks.len())?;
        let cited_chunk_refs = dedup_refs(refs);

        tracing::debug!(
            statements = statements.len(),
            cited = cited_chunk_refs.len(),
            tokens_used = completion.tokens_used,
            "generation parsed"
        );

        Ok(GenerationResult {
            statements,
            cited_chunk_refs,
            chunk_count: chunks.len(),
            metadata: GenerationMetadata {
                model: self.sampling.model.clone(),
                style,
                max_statements,
                query_chars: query_text.chars().count(),
                tokens_used: completion.tokens_used,
            },
        })
    }
}

fn build_system_prompt(style: Style, max_statements: usize) -> String {
    let style_instruction = match style {
        Style::Professional => {
            "Use polished, formal language that emphasizes expertise and reliability."
        }
        Style::Concise => "Keep every statement tight; cut filler words and qualifiers.",
        Style::Impact => {
            "Lead with strong action verbs and quantified outcomes wherever the source material supports them."
        }
    };

    format!(
        "You are an expert resume writer. Rewrite the supplied resume chunks so they speak directly to the job description.\n\
         Requirements:\n\
         1. Use only facts present in the supplied chunks. Never invent experience.\n\
         2. Start every statement with the bullet marker \"\u{2022}\".\n\
         3. End every statement with the references it draws from, e.g. [ref 1] or [ref 1, ref 2].\n\
         4. Produce at most {max_statements} statements.\n\
         5. {style_instruction}"
    )
}

fn build_user_prompt(query_text: &str, chunks: &[RetrievalResult], max_statements: usize) -> String {
    let mut context = String::new();
    for (index, chunk) in chunks.iter().enumerate() {
        context.push_str(&format!("**ref {}**: {}\n\n", index + 1, chunk.chunk_text));
    }

    format!(
        "**JOB DESCRIPTION:**\n{query_text}\n\n**RESUME CHUNKS:**\n{context}\
         **INSTRUCTIONS:** Rewrite the chunks above into at most {max_statements} statements tailored \
         to the job description, each ending with the references it draws from."
    )
}

// Labels are 1-based in the model's output and zero-based in cited_chunk_refs;
// out-of-range labels are dropped, the statements that carried them are kept.
pub fn parse_statements(
    raw: &str,
    chunk_count: usize,
) -> Result<(Vec<String>, Vec<usize>), PipelineError> {
    let bracket_group = Regex::new(r"\[([^\]]+)\]")?;
    let ref_label = Regex::new(r"ref\s*(\d+)")?;

    let mut statements = Vec::new();
    let mut cited = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let is_statement = trimmed.starts_with('\u{2022}')
            || trimmed.starts_with('-')
            || trimmed.starts_with('*');
        if !is_statement {
            continue;
        }

        statements.push(trimmed.to_string());
        for group in bracket_group.captures_iter(trimmed) {
            if let Some(inner) = group.get(1) {
                for label in ref_label.captures_iter(inner.as_str()) {
                    if let Some(digits) = label.get(1) {
                        if let Ok(number) = digits.as_str().parse::<usize>() {
                            if number >= 1 && number <= chunk_count {
                                cited.push(number - 1);
                            }
                        }
                    }
                }
            }
        }
    }

    if statements.is_empty() {
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.chars().count() > FALLBACK_MIN_CHARS {
                statements.push(format!("\u{2022} {trimmed}"));
                cited.push(0);
            }
        }
    }

    Ok((statements, cited))
}

fn dedup_refs(refs: Vec<usize>) -> Vec<usize> {
    let mut ordered = Vec::new();
    for reference in refs {
        if !ordered.contains(&reference) {
            ordered.push(reference);
        }
    }
    ordered
}
