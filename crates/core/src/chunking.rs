use crate::error::IngestError;
use crate::models::PipelineOptions;
use regex::Regex;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_words: usize,
    pub min_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: 200,
            min_words: 10,
        }
    }
}

impl From<&PipelineOptions> for ChunkingConfig {
    fn from(value: &PipelineOptions) -> Self {
        Self {
            max_words: value.chunk_max_words,
            min_words: value.min_chunk_words,
        }
    }
}

pub fn normalize_text(text: &str) -> Result<String, IngestError> {
    let spaces = Regex::new(r"[ \t]+")?;
    let newlines = Regex::new(r"\n+")?;
    let disallowed = Regex::new(r"[^\w\s.,;:!?\-()@]")?;

    let collapsed = spaces.replace_all(text, " ");
    let collapsed = newlines.replace_all(&collapsed, "\n");
    let stripped = disallowed.replace_all(&collapsed, " ");
    let cleaned = spaces.replace_all(&stripped, " ");
    Ok(cleaned.trim().to_string())
}

pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, IngestError> {
    // The fallback windows slice by max_words, which a zero size would panic on.
    if config.max_words == 0 {
        return Err(IngestError::Input(
            "max_words must be at least 1".to_string(),
        ));
    }

    let cleaned = normalize_text(text)?;
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    // A line opening with a run of 4+ capitals (e.g. EXPERIENCE) starts a section.
    let header = Regex::new(r"^[A-Z][A-Z ]{3,}")?;
    let sentence_boundary = Regex::new(r"[.!?]+|\n\n+")?;

    let mut chunks = Vec::new();
    for section in split_sections(&cleaned, &header) {
        let section_words = word_count(&section);
        if section_words <= config.max_words {
            if section_words >= config.min_words {
                chunks.push(section.trim().to_string());
            }
            continue;
        }

        let mut current = String::new();
        let mut current_words = 0usize;
        for sentence in split_sentences(&section, &sentence_boundary) {
            let sentence_words = word_count(&sentence);
            if current_words + sentence_words > config.max_words && !current.is_empty() {
                if current_words >= config.min_words {
                    chunks.push(current.trim().to_string());
                }
                current = sentence;
                current_words = sentence_words;
            } else {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&sentence);
                current_words += sentence_words;
            }
        }
        if current_words >= config.min_words {
            chunks.push(current.trim().to_string());
        }
    }

    if chunks.is_empty() {
        let words: Vec<&str> = cleaned.split_whitespace().collect();
        for window in words.chunks(config.max_words) {
            if window.len() >= config.min_words {
                chunks.push(window.join(" "));
            }
        }
    }

    Ok(chunks)
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn split_sections(text: &str, header: &Regex) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    for line in text.split('\n') {
        if header.is_match(line) && !current.is_empty() {
            sections.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        sections.push(current);
    }
    sections
}

fn split_sentences(section: &str, boundary: &Regex) -> Vec<String> {
    boundary
        .split(section)
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .map(str::to_string)
        .collect()
}
