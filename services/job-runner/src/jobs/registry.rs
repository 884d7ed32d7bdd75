//! Mapping from wire job type to job variant.

use super::{JobDefinition, JobKind, JobType, PrintJob, SendLocalizedEmailJob};
use crate::error::{DecodeError, RegistryError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Decodes a `d` mapping into a specific variant.
pub type DecodeFn = fn(Map<String, Value>) -> Result<JobKind, DecodeError>;

/// Registered variant: its type, name, and decoder.
#[derive(Clone, Copy)]
pub struct JobDescriptor {
    job_type: JobType,
    name: &'static str,
    decode: DecodeFn,
}

impl JobDescriptor {
    /// Descriptor for a [`JobDefinition`].
    #[must_use]
    pub fn of<T: JobDefinition>() -> Self {
        Self {
            job_type: T::JOB_TYPE,
            name: T::NAME,
            decode: decode_as::<T>,
        }
    }

    /// Type the variant is registered under.
    #[must_use]
    pub const fn job_type(&self) -> JobType {
        self.job_type
    }

    /// Variant name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Populate the variant from a `d` mapping.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the mapping is invalid.
    pub fn decode(&self, data: Map<String, Value>) -> Result<JobKind, DecodeError> {
        (self.decode)(data)
    }
}

impl fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("job_type", &self.job_type)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn decode_as<T: JobDefinition>(data: Map<String, Value>) -> Result<JobKind, DecodeError> {
    T::from_data(data).map(Into::into)
}

/// Immutable registry built once at startup.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: HashMap<i64, JobDescriptor>,
}

impl JobRegistry {
    /// Start an empty registry.
    #[must_use]
    pub fn builder() -> JobRegistryBuilder {
        JobRegistryBuilder::default()
    }

    /// Registry with every built-in job variant.
    ///
    /// # Errors
    ///
    /// Returns error if two built-in variants share a job type.
    pub fn standard() -> Result<Self, RegistryError> {
        Ok(Self::builder()
            .register::<SendLocalizedEmailJob>()?
            .register::<PrintJob>()?
            .build())
    }

    /// Find the variant registered under `job_type`.
    ///
    /// `None` is a normal outcome: newer runner versions may enqueue types this
    /// one does not know.
    #[must_use]
    pub fn lookup(&self, job_type: i64) -> Option<&JobDescriptor> {
        self.jobs.get(&job_type)
    }

    /// Number of registered variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no variant is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Collects job variants and checks their types are assigned and unique.
#[derive(Debug, Default)]
pub struct JobRegistryBuilder {
    jobs: HashMap<i64, JobDescriptor>,
}

impl JobRegistryBuilder {
    /// Register a [`JobDefinition`].
    ///
    /// # Errors
    ///
    /// Returns error if the definition's type is [`JobType::Unassigned`] or
    /// already registered.
    pub fn register<T: JobDefinition>(self) -> Result<Self, RegistryError> {
        self.register_descriptor(JobDescriptor::of::<T>())
    }

    /// Register a prepared descriptor.
    ///
    /// # Errors
    ///
    /// Returns error if the descriptor's type is [`JobType::Unassigned`] or
    /// already registered.
    pub fn register_descriptor(mut self, descriptor: JobDescriptor) -> Result<Self, RegistryError> {
        if descriptor.job_type == JobType::Unassigned {
            return Err(RegistryError::UnassignedJobType {
                name: descriptor.name,
            });
        }

        let id = descriptor.job_type.id();
        if let Some(existing) = self.jobs.get(&id) {
            return Err(RegistryError::DuplicateJobType {
                job_type: id,
                name: descriptor.name,
                existing: existing.name,
            });
        }

        debug!(job_type = %descriptor.job_type, name = descriptor.name, "Registered job");
        self.jobs.insert(id, descriptor);
        Ok(self)
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> JobRegistry {
        JobRegistry { jobs: self.jobs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Claims the print job type a second time.
    struct ShadowPrintJob;

    impl From<ShadowPrintJob> for JobKind {
        fn from(_: ShadowPrintJob) -> Self {
            Self::Print(PrintJob::new("shadow"))
        }
    }

    impl JobDefinition for ShadowPrintJob {
        const JOB_TYPE: JobType = JobType::Print;
        const NAME: &'static str = "ShadowPrintJob";

        fn from_data(_: Map<String, Value>) -> Result<Self, DecodeError> {
            Ok(Self)
        }
    }

    /// Never declared a job type.
    struct UntypedJob;

    impl From<UntypedJob> for JobKind {
        fn from(_: UntypedJob) -> Self {
            Self::Print(PrintJob::new("untyped"))
        }
    }

    impl JobDefinition for UntypedJob {
        const JOB_TYPE: JobType = JobType::Unassigned;
        const NAME: &'static str = "UntypedJob";

        fn from_data(_: Map<String, Value>) -> Result<Self, DecodeError> {
            Ok(Self)
        }
    }

    #[test]
    fn test_standard_registry() {
        let registry = JobRegistry::standard().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup(0).map(JobDescriptor::name),
            Some("SendLocalizedEmailJob")
        );
        assert_eq!(registry.lookup(666).map(JobDescriptor::name), Some("PrintJob"));
    }

    #[test]
    fn test_lookup_unknown_type() {
        let registry = JobRegistry::standard().unwrap();
        assert!(registry.lookup(42).is_none());
        assert!(registry.lookup(JobType::Unassigned.id()).is_none());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let err = JobRegistry::builder()
            .register::<PrintJob>()
            .unwrap()
            .register::<ShadowPrintJob>()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateJobType {
                job_type: 666,
                name: "ShadowPrintJob",
                existing: "PrintJob",
            }
        );
    }

    #[test]
    fn test_unassigned_type_rejected() {
        let err = JobRegistry::builder().register::<UntypedJob>().unwrap_err();
        assert_eq!(err, RegistryError::UnassignedJobType { name: "UntypedJob" });
    }

    #[test]
    fn test_empty_registry() {
        let registry = JobRegistry::builder().build();
        assert!(registry.is_empty());
    }
}
