//! Turns (job, resume) pairs into model instructions and normalizes what comes
//! back. Nothing here touches application state; callers commit results.

use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::ai::{AIProvider, CompletionRequest};
use crate::models::{EnhancedResume, Job, Resume, ResumeDocument};

pub const COVER_LETTER_FALLBACK: &str = "Error generating cover letter.";
pub const COVER_LETTER_EMPTY: &str = "Failed to generate cover letter.";
pub const INTERVIEW_GUIDE_FALLBACK: &str = "Error generating guide.";
pub const INTERVIEW_GUIDE_EMPTY: &str = "Failed to generate interview guide.";

pub const TECHNICAL_QUESTIONS: usize = 5;
pub const BEHAVIORAL_QUESTIONS: usize = 5;

const DEFAULT_LOCATION: &str = "Remote/India";
const LETTER_MAX_TOKENS: u32 = 2048;
const GUIDE_MAX_TOKENS: u32 = 4096;
const RESUME_MAX_TOKENS: u32 = 8192;

static FRESHER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(intern|internship|fresher|freshers|trainee|graduate|entry[- ]level|junior)\b")
        .expect("valid pattern")
});

static NCR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ncr|delhi|new delhi|noida|greater noida|gurgaon|gurugram|faridabad|ghaziabad)\b")
        .expect("valid pattern")
});

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Generation service error: {0:#}")]
    Service(#[source] anyhow::Error),

    #[error("Generation service returned an empty response")]
    EmptyResponse,

    #[error("Response does not match the resume schema: {0}")]
    SchemaViolation(String),
}

/// True for the fixed strings returned in place of generated text.
pub fn is_fallback(text: &str) -> bool {
    [
        COVER_LETTER_FALLBACK,
        COVER_LETTER_EMPTY,
        INTERVIEW_GUIDE_FALLBACK,
        INTERVIEW_GUIDE_EMPTY,
    ]
    .contains(&text)
}

/// Results of the combined "auto-pilot" run for one job.
#[derive(Debug)]
pub struct ApplicationPackage {
    pub resume: Result<ResumeDocument, GatewayError>,
    pub cover_letter: String,
}

impl ApplicationPackage {
    /// Writes the successful parts into the job. Returns whether anything changed.
    pub fn apply_to(&self, job: &mut Job) -> bool {
        let mut changed = false;
        if let Ok(document) = &self.resume {
            job.enhanced_resume = Some(EnhancedResume::Structured(document.clone()));
            changed = true;
        }
        if !is_fallback(&self.cover_letter) {
            job.cover_letter = self.cover_letter.clone();
            changed = true;
        }
        changed
    }
}

pub struct Gateway {
    writer: Arc<dyn AIProvider>,
    editor: Arc<dyn AIProvider>,
    schema: Value,
}

impl Gateway {
    /// `writer` drafts letters and guides; `editor` produces structured resumes.
    pub fn new(writer: Arc<dyn AIProvider>, editor: Arc<dyn AIProvider>) -> Self {
        Self {
            writer,
            editor,
            schema: resume_document_schema(),
        }
    }

    pub fn with_provider(provider: Arc<dyn AIProvider>) -> Self {
        Self::new(provider.clone(), provider)
    }

    pub async fn generate_cover_letter(&self, job: &Job, resume: &Resume) -> String {
        let prompt = cover_letter_prompt(job, resume);
        let request = CompletionRequest::text(&prompt, LETTER_MAX_TOKENS);
        match self.writer.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Empty cover letter from {}", self.writer.model_name());
                COVER_LETTER_EMPTY.to_string()
            }
            Err(e) => {
                error!("Cover letter generation failed: {:#}", e);
                COVER_LETTER_FALLBACK.to_string()
            }
        }
    }

    pub async fn enhance_resume(&self, job: &Job, resume: &Resume) -> Result<ResumeDocument, GatewayError> {
        let prompt = enhance_resume_prompt(job, resume);
        let request = CompletionRequest::structured(&prompt, RESUME_MAX_TOKENS, &self.schema);
        let text = self.editor.complete(&request).await.map_err(|e| {
            error!("Resume enhancement failed: {:#}", e);
            GatewayError::Service(e)
        })?;
        if text.trim().is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        parse_resume_document(&text).inspect_err(|e| warn!("{}", e))
    }

    pub async fn generate_interview_guide(&self, job: &Job) -> String {
        let prompt = interview_guide_prompt(job);
        let request = CompletionRequest::text(&prompt, GUIDE_MAX_TOKENS);
        match self.writer.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => INTERVIEW_GUIDE_EMPTY.to_string(),
            Err(e) => {
                error!("Interview guide generation failed: {:#}", e);
                INTERVIEW_GUIDE_FALLBACK.to_string()
            }
        }
    }

    /// Rewrites the resume and drafts the letter concurrently, returning once
    /// both have finished.
    pub async fn prepare_application(&self, job: &Job, resume: &Resume) -> ApplicationPackage {
        info!("Preparing application package for {} at {}", job.role, job.company);
        let (resume_result, cover_letter) = tokio::join!(
            self.enhance_resume(job, resume),
            self.generate_cover_letter(job, resume)
        );
        ApplicationPackage {
            resume: resume_result,
            cover_letter,
        }
    }
}

// --- Prompts ---

pub fn is_fresher_role(job: &Job) -> bool {
    FRESHER_PATTERN.is_match(&job.role) || FRESHER_PATTERN.is_match(&job.description)
}

pub fn is_ncr_location(job: &Job) -> bool {
    NCR_PATTERN.is_match(&job.location)
}

fn location_or_default(job: &Job) -> &str {
    if job.location.trim().is_empty() {
        DEFAULT_LOCATION
    } else {
        &job.location
    }
}

pub fn cover_letter_prompt(job: &Job, resume: &Resume) -> String {
    let fresher = if is_fresher_role(job) {
        "- This is a fresher/intern role: emphasize learning agility, core technical projects, and passion."
            .to_string()
    } else {
        "- If this is a fresher/intern role, emphasize learning agility, core technical projects, and passion."
            .to_string()
    };
    let onsite = if is_ncr_location(job) {
        format!(
            "- The role is based in the NCR region ({}): mention availability for onsite/hybrid work in that area.",
            job.location.trim()
        )
    } else {
        "- If it's in the NCR region (Delhi, Noida, Gurgaon), mention availability for onsite/hybrid in that area."
            .to_string()
    };
    let requirements = [fresher, onsite];

    format!(
        "Write a professional cover letter for the position of {role} at {company}.\n\
        Target Location/Type: {location}.\n\n\
        Context:\n\
        - Applicant: {name}\n\
        - My Resume Content: {context}\n\
        - Job Description: {description}\n\n\
        Requirements:\n\
        {requirements}\n\n\
        Output ONLY the letter text.",
        role = job.role,
        company = job.company,
        location = location_or_default(job),
        name = resume.full_name,
        context = resume.context(),
        description = job.description,
        requirements = requirements.join("\n"),
    )
}

pub fn enhance_resume_prompt(job: &Job, resume: &Resume) -> String {
    format!(
        "Act as an expert career consultant. Rewrite the following resume to perfectly match this job description.\n\n\
        Job: {role} at {company}\n\
        Job Description: {description}\n\
        Applicant: {name}\n\
        Original Resume: {context}\n\n\
        Optimization Rules:\n\
        1. Highlight skills that are specifically asked for in the job description.\n\
        2. If the candidate is a fresher/intern, focus on relevant projects, coursework, and certifications.\n\
        3. Ensure the tone is professional.\n\
        4. Keep every section of the original: header, professional summary, experience/projects, education, skills.\n\
        5. If the role is Tech/Consulting, prioritize problem-solving and specific tools.\n\
        6. Stay truthful: only use facts present in the original resume.\n\n\
        Return the ENTIRE optimized resume as a JSON object with: header (fullName, tagline, contact), \
        summary, experience (role, company, dates, bullets), education (degree, school, year) and skills.",
        role = job.role,
        company = job.company,
        description = job.description,
        name = resume.full_name,
        context = resume.context(),
    )
}

pub fn interview_guide_prompt(job: &Job) -> String {
    format!(
        "Create an interview prep guide for {role} at {company}.\n\
        JD: {description}.\n\
        Include the top {technical} technical and {behavioral} behavioral questions with ideal answers \
        for a fresher/junior level candidate.",
        role = job.role,
        company = job.company,
        description = job.description,
        technical = TECHNICAL_QUESTIONS,
        behavioral = BEHAVIORAL_QUESTIONS,
    )
}

// --- Structured output ---

/// JSON Schema for `ResumeDocument`; every property required, no extras.
pub fn resume_document_schema() -> Value {
    let string_list = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["header", "summary", "experience", "education", "skills"],
        "properties": {
            "header": {
                "type": "object",
                "additionalProperties": false,
                "required": ["fullName", "tagline", "contact"],
                "properties": {
                    "fullName": {"type": "string"},
                    "tagline": {"type": "string"},
                    "contact": string_list,
                }
            },
            "summary": {"type": "string"},
            "experience": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["role", "company", "dates", "bullets"],
                    "properties": {
                        "role": {"type": "string"},
                        "company": {"type": "string"},
                        "dates": {"type": "string"},
                        "bullets": string_list,
                    }
                }
            },
            "education": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["degree", "school", "year"],
                    "properties": {
                        "degree": {"type": "string"},
                        "school": {"type": "string"},
                        "year": {"type": "string"},
                    }
                }
            },
            "skills": string_list,
        }
    })
}

/// Parses and checks a model response. Anything short of a complete document
/// is rejected.
pub fn parse_resume_document(text: &str) -> Result<ResumeDocument, GatewayError> {
    let text = strip_json_fences(text);
    let value: Value = serde_json::from_str(text).map_err(|e| GatewayError::SchemaViolation(e.to_string()))?;
    reject_unknown_keys(&value)?;
    let mut document: ResumeDocument =
        serde_json::from_value(value).map_err(|e| GatewayError::SchemaViolation(e.to_string()))?;

    if document.header.full_name.trim().is_empty() {
        return Err(GatewayError::SchemaViolation("header.fullName is empty".to_string()));
    }
    if let Some(i) = document
        .experience
        .iter()
        .position(|e| e.role.trim().is_empty() || e.company.trim().is_empty())
    {
        return Err(GatewayError::SchemaViolation(format!(
            "experience[{}] is missing role or company",
            i
        )));
    }

    // Skills are a set; keep first occurrence order.
    let mut seen = HashSet::new();
    document.skills.retain(|s| {
        let s = s.trim();
        !s.is_empty() && seen.insert(s.to_lowercase())
    });

    Ok(document)
}

const DOCUMENT_KEYS: &[&str] = &["header", "summary", "experience", "education", "skills"];
const HEADER_KEYS: &[&str] = &["fullName", "tagline", "contact"];
const EXPERIENCE_KEYS: &[&str] = &["role", "company", "dates", "bullets"];
const EDUCATION_KEYS: &[&str] = &["degree", "school", "year"];

/// Model output must not carry properties outside the schema. Stored documents
/// are read leniently, so this check lives here rather than on the types.
fn reject_unknown_keys(value: &Value) -> Result<(), GatewayError> {
    check_keys("document", value, DOCUMENT_KEYS)?;
    check_keys("header", &value["header"], HEADER_KEYS)?;
    for (section, allowed) in [("experience", EXPERIENCE_KEYS), ("education", EDUCATION_KEYS)] {
        if let Some(entries) = value[section].as_array() {
            for (i, entry) in entries.iter().enumerate() {
                check_keys(&format!("{}[{}]", section, i), entry, allowed)?;
            }
        }
    }
    Ok(())
}

fn check_keys(path: &str, value: &Value, allowed: &[&str]) -> Result<(), GatewayError> {
    let Some(object) = value.as_object() else {
        return Ok(());
    };
    match object.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(GatewayError::SchemaViolation(format!(
            "unexpected property '{}' in {}",
            key, path
        ))),
        None => Ok(()),
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
