pub mod auth;
pub mod config;
pub mod store;
pub mod types;

pub use auth::{AuthError, AuthResult, Authenticator, Claims};
pub use config::AuthConfig;
pub use store::{CollegeStore, InMemoryStore, StoreError, StoreResult};
pub use types::{
    Course, CourseInput, Enrollment, EnrollmentInput, EntityKind, RecordId, Student, StudentInput,
    Token,
};
