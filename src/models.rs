use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length cap for the skills summary derived from the full resume text.
pub const SKILLS_SUMMARY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Applied,
    Interview,
    Offer,
    Rejected,
    Accepted,
    #[serde(rename = "Auto-Pilot")]
    AutoPilot,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Applied,
        JobStatus::Interview,
        JobStatus::Offer,
        JobStatus::Rejected,
        JobStatus::Accepted,
        JobStatus::AutoPilot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Applied => "Applied",
            JobStatus::Interview => "Interview",
            JobStatus::Offer => "Offer",
            JobStatus::Rejected => "Rejected",
            JobStatus::Accepted => "Accepted",
            JobStatus::AutoPilot => "Auto-Pilot",
        }
    }

    /// Offers view shows jobs that reached an offer, accepted or not.
    pub fn is_offer(&self) -> bool {
        matches!(self, JobStatus::Offer | JobStatus::Accepted)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "applied" => Ok(JobStatus::Applied),
            "interview" => Ok(JobStatus::Interview),
            "offer" => Ok(JobStatus::Offer),
            "rejected" => Ok(JobStatus::Rejected),
            "accepted" => Ok(JobStatus::Accepted),
            "autopilot" => Ok(JobStatus::AutoPilot),
            _ => {
                let available: Vec<String> = JobStatus::ALL.iter().map(|st| st.as_str().to_lowercase()).collect();
                Err(format!("Unknown status '{}'. Available: {}", s, available.join(", ")))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Application,
    Offer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub company: String,
    pub role: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub salary: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub date_applied: DateTime<Utc>,
    #[serde(default)]
    pub cover_letter: String,
    #[serde(
        default,
        alias = "enhancedResumeText",
        deserialize_with = "deserialize_enhanced_resume",
        skip_serializing_if = "Option::is_none"
    )]
    pub enhanced_resume: Option<EnhancedResume>,
    #[serde(default)]
    pub origin: Origin,
}

impl Job {
    /// A fresh application with a new id, stamped now.
    pub fn new(company: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: fresh_id(),
            company: company.into(),
            role: role.into(),
            status: JobStatus::default(),
            salary: String::new(),
            location: String::new(),
            description: String::new(),
            date_applied: Utc::now(),
            cover_letter: String::new(),
            enhanced_resume: None,
            origin: Origin::default(),
        }
    }

    pub fn has_required_fields(&self) -> bool {
        !self.company.trim().is_empty() && !self.role.trim().is_empty()
    }

    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

pub fn fresh_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// AI-enhanced resume attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum EnhancedResume {
    Unstructured(String),
    Structured(ResumeDocument),
}

impl EnhancedResume {
    /// Upgrades a pre-versioned `enhancedResumeText` string. Older records stored
    /// either narrative text or the JSON of a structured document in that field.
    pub fn from_legacy_text(text: &str) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<ResumeDocument>(text) {
            Ok(document) => Some(EnhancedResume::Structured(document)),
            Err(_) => Some(EnhancedResume::Unstructured(text.to_string())),
        }
    }

    pub fn render(&self, width: usize) -> String {
        match self {
            EnhancedResume::Unstructured(text) => text.clone(),
            EnhancedResume::Structured(document) => document.to_markdown(width),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnhancedResumeRepr {
    Tagged(EnhancedResume),
    Legacy(String),
}

fn deserialize_enhanced_resume<'de, D>(deserializer: D) -> Result<Option<EnhancedResume>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<EnhancedResumeRepr>::deserialize(deserializer)?;
    Ok(match repr {
        None => None,
        Some(EnhancedResumeRepr::Tagged(enhanced)) => Some(enhanced),
        Some(EnhancedResumeRepr::Legacy(text)) => EnhancedResume::from_legacy_text(&text),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDocument {
    pub header: ResumeHeader,
    pub summary: String,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeHeader {
    pub full_name: String,
    pub tagline: String,
    pub contact: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub role: String,
    pub company: String,
    pub dates: String,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub degree: String,
    pub school: String,
    pub year: String,
}

impl ResumeDocument {
    pub fn to_markdown(&self, width: usize) -> String {
        let width = width.max(20);
        let mut out = String::new();

        out.push_str(&format!("# {}\n", self.header.full_name));
        if !self.header.tagline.is_empty() {
            out.push_str(&format!("**{}**\n", self.header.tagline));
        }
        if !self.header.contact.is_empty() {
            out.push_str(&format!("{}\n", self.header.contact.join(" | ")));
        }

        if !self.summary.is_empty() {
            out.push_str("\n## Summary\n\n");
            out.push_str(&textwrap::fill(&self.summary, width));
            out.push('\n');
        }

        if !self.experience.is_empty() {
            out.push_str("\n## Experience\n");
            for exp in &self.experience {
                out.push_str(&format!("\n### {}, {}", exp.role, exp.company));
                if !exp.dates.is_empty() {
                    out.push_str(&format!(" ({})", exp.dates));
                }
                out.push('\n');
                let options = textwrap::Options::new(width)
                    .initial_indent("- ")
                    .subsequent_indent("  ");
                for bullet in &exp.bullets {
                    out.push_str(&textwrap::fill(bullet, &options));
                    out.push('\n');
                }
            }
        }

        if !self.education.is_empty() {
            out.push_str("\n## Education\n\n");
            for edu in &self.education {
                out.push_str(&format!("- {}, {}", edu.degree, edu.school));
                if !edu.year.is_empty() {
                    out.push_str(&format!(" ({})", edu.year));
                }
                out.push('\n');
            }
        }

        if !self.skills.is_empty() {
            out.push_str("\n## Skills\n\n");
            out.push_str(&textwrap::fill(&self.skills.join(", "), width));
            out.push('\n');
        }

        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_text: Option<String>,
}

impl Resume {
    /// Stores the full text and refreshes the bounded skills summary from it.
    pub fn set_resume_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.skills = summarize(&text, SKILLS_SUMMARY_LIMIT);
        self.resume_text = Some(text);
    }

    /// Context handed to the generator: full text when present, else the summary.
    pub fn context(&self) -> &str {
        match self.resume_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.skills,
        }
    }

    pub fn has_full_text(&self) -> bool {
        self.resume_text
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.trim().is_empty() && self.context().trim().is_empty()
    }
}

fn summarize(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Screen selector. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Dashboard,
    Jobs,
    Offers,
    Settings,
}

impl View {
    pub const ALL: [View; 4] = [View::Dashboard, View::Jobs, View::Offers, View::Settings];

    pub fn title(&self) -> &'static str {
        match self {
            View::Dashboard => "Dashboard",
            View::Jobs => "My Applications",
            View::Offers => "Offers Received",
            View::Settings => "Settings",
        }
    }

    pub fn index(&self) -> usize {
        View::ALL.iter().position(|v| v == self).unwrap_or(0)
    }

    pub fn next(&self) -> View {
        View::ALL[(self.index() + 1) % View::ALL.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> ResumeDocument {
        ResumeDocument {
            header: ResumeHeader {
                full_name: "Jane Doe".to_string(),
                tagline: "Backend Engineer".to_string(),
                contact: vec!["jane@example.com".to_string(), "Noida".to_string()],
            },
            summary: "Builds reliable services.".to_string(),
            experience: vec![ExperienceEntry {
                role: "Intern".to_string(),
                company: "Acme".to_string(),
                dates: "2023".to_string(),
                bullets: vec!["Shipped the billing API".to_string()],
            }],
            education: vec![EducationEntry {
                degree: "B.Tech".to_string(),
                school: "IIT".to_string(),
                year: "2024".to_string(),
            }],
            skills: vec!["Rust".to_string(), "Go".to_string()],
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("offer".parse::<JobStatus>().unwrap(), JobStatus::Offer);
        assert_eq!("Auto-Pilot".parse::<JobStatus>().unwrap(), JobStatus::AutoPilot);
        assert_eq!("autopilot".parse::<JobStatus>().unwrap(), JobStatus::AutoPilot);
        assert!("hired".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_with_hyphen() {
        let json = serde_json::to_string(&JobStatus::AutoPilot).unwrap();
        assert_eq!(json, "\"Auto-Pilot\"");
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new("Acme", "Engineer");
        assert_eq!(job.status, JobStatus::Applied);
        assert_eq!(job.origin, Origin::Application);
        assert!(!job.id.is_empty());
        assert!(job.cover_letter.is_empty());
        assert!(job.enhanced_resume.is_none());
        assert_eq!(job.short_id().len(), 8);
    }

    #[test]
    fn test_legacy_job_with_narrative_resume_text() {
        let json = r#"{
            "id": "k3j9x0abc",
            "company": "Acme",
            "role": "Engineer",
            "status": "Interview",
            "salary": "",
            "location": "Delhi",
            "dateApplied": "2024-05-01T10:00:00.000Z",
            "description": "Rust",
            "coverLetter": "",
            "enhancedResumeText": "PROFESSIONAL SUMMARY\nBuilds things.",
            "origin": "application"
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.status, JobStatus::Interview);
        assert_eq!(
            job.enhanced_resume,
            Some(EnhancedResume::Unstructured(
                "PROFESSIONAL SUMMARY\nBuilds things.".to_string()
            ))
        );
    }

    #[test]
    fn test_legacy_job_with_structured_resume_text() {
        let document = sample_document();
        let legacy = serde_json::json!({
            "id": "abc",
            "company": "Acme",
            "role": "Engineer",
            "dateApplied": "2024-05-01T10:00:00Z",
            "enhancedResumeText": serde_json::to_string(&document).unwrap(),
        });
        let job: Job = serde_json::from_value(legacy).unwrap();
        assert_eq!(job.enhanced_resume, Some(EnhancedResume::Structured(document)));
        // Fields introduced later fall back to their defaults.
        assert_eq!(job.origin, Origin::Application);
        assert_eq!(job.status, JobStatus::Applied);
    }

    #[test]
    fn test_legacy_structured_text_with_extra_keys_stays_structured() {
        let text = r#"{"header":{"fullName":"Jane","tagline":"","contact":[]},"summary":"",
            "experience":[],"education":[],"skills":[],"certifications":["AWS"]}"#;
        assert!(matches!(
            EnhancedResume::from_legacy_text(text),
            Some(EnhancedResume::Structured(_))
        ));
    }

    #[test]
    fn test_empty_legacy_resume_text_is_none() {
        let legacy = serde_json::json!({
            "id": "abc",
            "company": "Acme",
            "role": "Engineer",
            "dateApplied": "2024-05-01T10:00:00Z",
            "enhancedResumeText": "",
        });
        let job: Job = serde_json::from_value(legacy).unwrap();
        assert!(job.enhanced_resume.is_none());
    }

    #[test]
    fn test_tagged_enhanced_resume_serialization() {
        let enhanced = EnhancedResume::Unstructured("text".to_string());
        let value = serde_json::to_value(&enhanced).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "unstructured", "value": "text"}));
    }

    #[test]
    fn test_set_resume_text_caps_skills() {
        let mut resume = Resume::default();
        let long = "é".repeat(SKILLS_SUMMARY_LIMIT + 50);
        resume.set_resume_text(long.clone());
        assert_eq!(resume.skills.chars().count(), SKILLS_SUMMARY_LIMIT);
        assert_eq!(resume.resume_text.as_deref(), Some(long.as_str()));
    }

    #[test]
    fn test_resume_context_prefers_full_text() {
        let mut resume = Resume {
            full_name: "Jane".to_string(),
            skills: "React, Go".to_string(),
            resume_text: Some("   ".to_string()),
        };
        assert_eq!(resume.context(), "React, Go");
        resume.resume_text = Some("Full resume".to_string());
        assert_eq!(resume.context(), "Full resume");
    }

    #[test]
    fn test_markdown_rendering() {
        let md = sample_document().to_markdown(80);
        assert!(md.starts_with("# Jane Doe\n"));
        assert!(md.contains("### Intern, Acme (2023)"));
        assert!(md.contains("- Shipped the billing API"));
        assert!(md.contains("- B.Tech, IIT (2024)"));
        assert!(md.contains("Rust, Go"));
    }

    #[test]
    fn test_view_cycles() {
        assert_eq!(View::default(), View::Dashboard);
        assert_eq!(View::Settings.next(), View::Dashboard);
        assert_eq!(View::Jobs.index(), 1);
    }
}
