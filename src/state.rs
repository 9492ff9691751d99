use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{Job, JobStatus, Resume, View, fresh_id};
use crate::store::{KeyValueStore, StoreAdapter, StoreError};

/// Similarity above which two applications are reported as likely duplicates.
const DUPLICATE_THRESHOLD: f64 = 0.9;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid backup: missing '{0}'")]
    MissingField(&'static str),

    #[error("Invalid backup: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Narrows the job list the way the tracker screens do.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub search: Option<String>,
    pub status: Option<JobStatus>,
    pub offers_only: bool,
}

impl JobFilter {
    pub fn for_view(view: View) -> Self {
        Self {
            offers_only: view == View::Offers,
            ..Self::default()
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                job.company.to_lowercase().contains(&term) || job.role.to_lowercase().contains(&term)
            }
            _ => true,
        };
        let matches_status = self.status.is_none_or(|status| job.status == status);
        let matches_mode = !self.offers_only || job.status.is_offer();
        matches_search && matches_status && matches_mode
    }
}

/// Single in-memory copy of the jobs, the resume profile and the current view.
/// Every mutation updates memory first, then writes through the store.
pub struct AppState<S: KeyValueStore> {
    store: StoreAdapter<S>,
    jobs: Vec<Job>,
    resume: Resume,
    view: View,
}

impl<S: KeyValueStore> AppState<S> {
    pub fn load(backend: S) -> Self {
        let store = StoreAdapter::new(backend);
        let (jobs, resume) = store.load();
        Self {
            store,
            jobs,
            resume,
            view: View::default(),
        }
    }

    pub fn store(&self) -> &StoreAdapter<S> {
        &self.store
    }

    // --- Jobs ---

    /// Newest first.
    pub fn list_jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get_job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Resolves a full id or an unambiguous id prefix.
    pub fn find_job(&self, id_or_prefix: &str) -> Option<&Job> {
        if let Some(job) = self.get_job(id_or_prefix) {
            return Some(job);
        }
        let mut candidates = self.jobs.iter().filter(|j| j.id.starts_with(id_or_prefix));
        match (candidates.next(), candidates.next()) {
            (Some(job), None) if !id_or_prefix.is_empty() => Some(job),
            _ => None,
        }
    }

    pub fn filtered_jobs(&self, filter: &JobFilter) -> Vec<&Job> {
        self.jobs.iter().filter(|j| filter.matches(j)).collect()
    }

    /// Existing applications whose company and role closely match.
    pub fn find_similar(&self, company: &str, role: &str) -> Vec<&Job> {
        let key = duplicate_key(company, role);
        self.jobs
            .iter()
            .filter(|j| strsim::normalized_levenshtein(&duplicate_key(&j.company, &j.role), &key) >= DUPLICATE_THRESHOLD)
            .collect()
    }

    /// Prepends the job. Blank company or role is ignored (`Ok(None)`); callers
    /// validate before getting here. An empty or already-used id is replaced.
    pub fn add_job(&mut self, mut job: Job) -> Result<Option<String>, StoreError> {
        if !job.has_required_fields() {
            debug!("Ignoring job with blank company or role");
            return Ok(None);
        }

        let ids: HashSet<&str> = self.jobs.iter().map(|j| j.id.as_str()).collect();
        if job.id.trim().is_empty() || ids.contains(job.id.as_str()) {
            job.id = fresh_id();
            while ids.contains(job.id.as_str()) {
                job.id = fresh_id();
            }
        }

        let id = job.id.clone();
        info!("Adding job {} ({} at {})", id, job.role, job.company);
        self.jobs.insert(0, job);
        self.persist_jobs()?;
        Ok(Some(id))
    }

    /// Replaces the job with the same id. Returns whether anything matched.
    pub fn update_job(&mut self, job: Job) -> Result<bool, StoreError> {
        let Some(slot) = self.jobs.iter_mut().find(|j| j.id == job.id) else {
            debug!("update_job: no job with id {}", job.id);
            return Ok(false);
        };
        *slot = job;
        self.persist_jobs()?;
        Ok(true)
    }

    /// Removes the job with this id. Returns whether anything was removed.
    pub fn delete_job(&mut self, id: &str) -> Result<bool, StoreError> {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.id != id);
        if self.jobs.len() == before {
            debug!("delete_job: no job with id {}", id);
            return Ok(false);
        }
        info!("Deleted job {}", id);
        self.persist_jobs()?;
        Ok(true)
    }

    // --- Resume ---

    pub fn resume(&self) -> &Resume {
        &self.resume
    }

    pub fn set_resume(&mut self, resume: Resume) -> Result<(), StoreError> {
        self.resume = resume;
        self.persist_resume()
    }

    pub fn wipe_resume(&mut self) -> Result<(), StoreError> {
        info!("Wiping resume profile");
        self.set_resume(Resume::default())
    }

    // --- Backup restore ---

    /// Replaces both collections. Rejected, with nothing changed, unless both
    /// are present.
    pub fn import_all(&mut self, jobs: Option<Vec<Job>>, resume: Option<Resume>) -> Result<(), ImportError> {
        let jobs = jobs.ok_or(ImportError::MissingField("jobs"))?;
        let resume = resume.ok_or(ImportError::MissingField("resume"))?;

        info!("Importing {} job(s) and resume profile", jobs.len());
        self.jobs = jobs;
        self.resume = resume;
        self.persist_jobs()?;
        self.persist_resume()?;
        Ok(())
    }

    // --- View ---

    pub fn view(&self) -> View {
        self.view
    }

    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    fn persist_jobs(&self) -> Result<(), StoreError> {
        self.store.save_jobs(&self.jobs).inspect_err(|e| {
            error!("Failed to persist jobs: {}", e);
        })
    }

    fn persist_resume(&self) -> Result<(), StoreError> {
        self.store.save_resume(&self.resume).inspect_err(|e| {
            error!("Failed to persist resume: {}", e);
        })
    }
}

fn duplicate_key(company: &str, role: &str) -> String {
    format!("{}|{}", company.trim().to_lowercase(), role.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnhancedResume, Origin};
    use chrono::Utc;
    use crate::store::MemoryStore;

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    fn empty_state() -> AppState<MemoryStore> {
        AppState::load(MemoryStore::new())
    }

    #[test]
    fn test_add_job_scenario() {
        let mut state = empty_state();
        let id = state.add_job(Job::new("Acme", "Engineer")).unwrap().unwrap();

        let jobs = state.list_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert!(!id.is_empty());
        assert_eq!(jobs[0].status, JobStatus::Applied);
        assert!(jobs[0].date_applied <= Utc::now());
    }

    #[test]
    fn test_add_job_ids_are_unique() {
        let mut state = empty_state();
        for i in 0..500 {
            state.add_job(Job::new(format!("Company {i}"), "Engineer")).unwrap();
        }
        let ids: HashSet<&str> = state.list_jobs().iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_add_job_replaces_blank_and_colliding_ids() {
        let mut state = empty_state();
        let mut first = Job::new("Acme", "Engineer");
        first.id = "fixed".to_string();
        let mut second = Job::new("Beta", "Analyst");
        second.id = "fixed".to_string();
        let mut third = Job::new("Gamma", "Designer");
        third.id = String::new();

        assert_eq!(state.add_job(first).unwrap().as_deref(), Some("fixed"));
        let second_id = state.add_job(second).unwrap().unwrap();
        let third_id = state.add_job(third).unwrap().unwrap();
        assert_ne!(second_id, "fixed");
        assert!(!third_id.is_empty());
    }

    #[test]
    fn test_add_job_newest_first() {
        let mut state = empty_state();
        state.add_job(Job::new("A", "Role A")).unwrap();
        state.add_job(Job::new("B", "Role B")).unwrap();
        let companies: Vec<&str> = state.list_jobs().iter().map(|j| j.company.as_str()).collect();
        assert_eq!(companies, vec!["B", "A"]);
    }

    #[test]
    fn test_add_job_ignores_blank_required_fields() {
        let mut state = empty_state();
        assert_eq!(state.add_job(Job::new("  ", "Engineer")).unwrap(), None);
        assert_eq!(state.add_job(Job::new("Acme", "")).unwrap(), None);
        assert!(state.list_jobs().is_empty());
    }

    #[test]
    fn test_update_job_changes_only_target() {
        let mut state = empty_state();
        let id = state.add_job(Job::new("Acme", "Engineer")).unwrap().unwrap();
        state.add_job(Job::new("Beta", "Analyst")).unwrap();
        let before = state.list_jobs().to_vec();

        let mut job = state.get_job(&id).unwrap().clone();
        job.status = JobStatus::Offer;
        assert!(state.update_job(job.clone()).unwrap());
        let after_first = state.list_jobs().to_vec();
        assert!(state.update_job(job).unwrap());
        assert_eq!(state.list_jobs(), after_first.as_slice());

        let offers: Vec<&Job> = state.list_jobs().iter().filter(|j| j.status == JobStatus::Offer).collect();
        assert_eq!(offers.len(), 1);
        let updated = offers[0];
        let original = before.iter().find(|j| j.id == id).unwrap();
        assert_eq!(updated.company, original.company);
        assert_eq!(updated.role, original.role);
        assert_eq!(updated.date_applied, original.date_applied);
        assert_eq!(state.list_jobs()[0], before[0]);
    }

    #[test]
    fn test_update_unknown_job_is_noop() {
        let mut state = empty_state();
        state.add_job(Job::new("Acme", "Engineer")).unwrap();
        let before = state.list_jobs().to_vec();
        assert!(!state.update_job(Job::new("Ghost", "Nobody")).unwrap());
        assert_eq!(state.list_jobs(), before.as_slice());
    }

    #[test]
    fn test_delete_job() {
        let mut state = empty_state();
        let a = state.add_job(Job::new("A", "Role")).unwrap().unwrap();
        state.add_job(Job::new("B", "Role")).unwrap();
        let survivor = state.list_jobs()[0].clone();

        assert!(!state.delete_job("missing").unwrap());
        assert_eq!(state.list_jobs().len(), 2);

        assert!(state.delete_job(&a).unwrap());
        assert_eq!(state.list_jobs(), &[survivor]);
    }

    #[test]
    fn test_mutations_persist_through_store() {
        let store = MemoryStore::new();
        let mut state = AppState::load(store.clone());
        let id = state.add_job(Job::new("Acme", "Engineer")).unwrap().unwrap();
        let mut job = state.get_job(&id).unwrap().clone();
        job.cover_letter = "Dear Acme".to_string();
        job.enhanced_resume = Some(EnhancedResume::Unstructured("Resume".to_string()));
        state.update_job(job).unwrap();

        let reloaded = AppState::load(store);
        assert_eq!(reloaded.list_jobs(), state.list_jobs());
        assert_eq!(reloaded.list_jobs()[0].cover_letter, "Dear Acme");
    }

    #[test]
    fn test_set_resume_survives_reload() {
        let store = MemoryStore::new();
        let resume = Resume {
            full_name: "Jane Doe".to_string(),
            skills: "React, Go".to_string(),
            resume_text: Some(String::new()),
        };
        {
            let mut state = AppState::load(store.clone());
            state.set_resume(resume.clone()).unwrap();
        }
        let reloaded = AppState::load(store);
        assert_eq!(reloaded.resume(), &resume);
    }

    #[test]
    fn test_wipe_resume() {
        let store = MemoryStore::new();
        let mut state = AppState::load(store.clone());
        let mut resume = Resume::default();
        resume.full_name = "Jane".to_string();
        resume.set_resume_text("Rust developer");
        state.set_resume(resume).unwrap();
        state.wipe_resume().unwrap();
        assert_eq!(AppState::load(store).resume(), &Resume::default());
    }

    #[test]
    fn test_import_all_requires_both_fields() {
        let mut state = empty_state();
        state.add_job(Job::new("Acme", "Engineer")).unwrap();
        let before = state.list_jobs().to_vec();

        let err = state.import_all(None, Some(Resume::default())).unwrap_err();
        assert!(matches!(err, ImportError::MissingField("jobs")));
        let err = state.import_all(Some(vec![]), None).unwrap_err();
        assert!(matches!(err, ImportError::MissingField("resume")));
        assert_eq!(state.list_jobs(), before.as_slice());
    }

    #[test]
    fn test_import_all_replaces_both() {
        let store = MemoryStore::new();
        let mut state = AppState::load(store.clone());
        state.add_job(Job::new("Old", "Job")).unwrap();

        let mut imported = Job::new("New", "Job");
        imported.origin = Origin::Offer;
        let resume = Resume {
            full_name: "Imported".to_string(),
            ..Resume::default()
        };
        state.import_all(Some(vec![imported.clone()]), Some(resume.clone())).unwrap();

        let reloaded = AppState::load(store);
        assert_eq!(reloaded.list_jobs(), &[imported]);
        assert_eq!(reloaded.resume(), &resume);
    }

    #[test]
    fn test_persist_failure_is_reported_but_memory_updated() {
        let mut state = AppState::load(FailingStore);
        let result = state.add_job(Job::new("Acme", "Engineer"));
        assert!(result.is_err());
        assert_eq!(state.list_jobs().len(), 1);
    }

    #[test]
    fn test_view_is_not_persisted() {
        let store = MemoryStore::new();
        let mut state = AppState::load(store.clone());
        assert_eq!(state.view(), View::Dashboard);
        state.set_view(View::Settings);
        assert_eq!(state.view(), View::Settings);
        assert_eq!(AppState::load(store).view(), View::Dashboard);
    }

    #[test]
    fn test_filtered_jobs() {
        let mut state = empty_state();
        let mut offer = Job::new("Acme", "Backend Engineer");
        offer.status = JobStatus::Offer;
        let mut accepted = Job::new("Beta", "Data Analyst");
        accepted.status = JobStatus::Accepted;
        state.add_job(offer).unwrap();
        state.add_job(accepted).unwrap();
        state.add_job(Job::new("Gamma", "Frontend Engineer")).unwrap();

        let search = JobFilter {
            search: Some("engineer".to_string()),
            ..JobFilter::default()
        };
        assert_eq!(state.filtered_jobs(&search).len(), 2);

        let offers = state.filtered_jobs(&JobFilter::for_view(View::Offers));
        assert_eq!(offers.len(), 2);

        let status = JobFilter {
            status: Some(JobStatus::Applied),
            ..JobFilter::default()
        };
        let applied = state.filtered_jobs(&status);
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].company, "Gamma");
    }

    #[test]
    fn test_find_job_by_prefix() {
        let mut state = empty_state();
        let mut a = Job::new("A", "Role");
        a.id = "abc123".to_string();
        let mut b = Job::new("B", "Role");
        b.id = "abd456".to_string();
        state.add_job(a).unwrap();
        state.add_job(b).unwrap();

        assert_eq!(state.find_job("abc").map(|j| j.company.as_str()), Some("A"));
        assert!(state.find_job("ab").is_none());
        assert!(state.find_job("").is_none());
        assert_eq!(state.find_job("abd456").map(|j| j.company.as_str()), Some("B"));
    }

    #[test]
    fn test_find_similar() {
        let mut state = empty_state();
        state.add_job(Job::new("Acme Corp", "Software Engineer")).unwrap();
        assert_eq!(state.find_similar("acme corp", "Software Engineer ").len(), 1);
        assert!(state.find_similar("Beta", "Designer").is_empty());
    }
}
