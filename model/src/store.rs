use crate::types::{
    Course, CourseInput, Enrollment, EnrollmentInput, EntityKind, RecordId, Student, StudentInput,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found")]
    NotFound { entity: EntityKind, id: RecordId },

    /// A record refers to another record that does not exist.
    #[error("{entity} with ID {id} not found")]
    MissingReference { entity: EntityKind, id: RecordId },
}

impl StoreError {
    fn not_found(entity: EntityKind, id: RecordId) -> Self {
        Self::NotFound { entity, id }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CollegeStore: Send + Sync {
    async fn list_students(&self) -> Vec<Student>;
    async fn create_student(&self, input: StudentInput) -> Student;
    async fn get_student(&self, id: RecordId) -> StoreResult<Student>;
    async fn update_student(&self, id: RecordId, input: StudentInput) -> StoreResult<Student>;
    async fn delete_student(&self, id: RecordId) -> StoreResult<()>;

    async fn list_courses(&self) -> Vec<Course>;
    async fn create_course(&self, input: CourseInput) -> Course;
    async fn get_course(&self, id: RecordId) -> StoreResult<Course>;
    async fn update_course(&self, id: RecordId, input: CourseInput) -> StoreResult<Course>;
    async fn delete_course(&self, id: RecordId) -> StoreResult<()>;

    async fn list_enrollments(&self) -> Vec<Enrollment>;
    /// Fails when the referenced student or course is unknown. The student is
    /// checked first.
    async fn create_enrollment(&self, input: EnrollmentInput) -> StoreResult<Enrollment>;
    async fn get_enrollment(&self, id: RecordId) -> StoreResult<Enrollment>;
    async fn delete_enrollment(&self, id: RecordId) -> StoreResult<()>;

    fn store_name(&self) -> &'static str;
}

/// One collection with its own id sequence. Ids are never reused, so the
/// map's key order is also creation order.
#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<RecordId, T>,
    next_id: RecordId,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn insert_with(&mut self, build: impl FnOnce(RecordId) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    fn list(&self) -> Vec<T> {
        self.rows.values().cloned().collect()
    }

    fn get(&self, id: RecordId) -> Option<T> {
        self.rows.get(&id).cloned()
    }

    fn contains(&self, id: RecordId) -> bool {
        self.rows.contains_key(&id)
    }

    fn replace(&mut self, id: RecordId, row: T) -> Option<T> {
        let slot = self.rows.get_mut(&id)?;
        *slot = row.clone();
        Some(row)
    }

    fn remove(&mut self, id: RecordId) -> bool {
        self.rows.remove(&id).is_some()
    }
}

#[derive(Debug)]
struct Tables {
    students: Table<Student>,
    courses: Table<Course>,
    enrollments: Table<Enrollment>,
}

/// Process-local store. All collections share one lock so that enrollment
/// creation sees a consistent view of students and courses.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                students: Table::new(),
                courses: Table::new(),
                enrollments: Table::new(),
            }),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollegeStore for InMemoryStore {
    async fn list_students(&self) -> Vec<Student> {
        self.tables.read().await.students.list()
    }

    async fn create_student(&self, input: StudentInput) -> Student {
        let student = self.tables.write().await.students.insert_with(|id| Student {
            id,
            major: input.major,
            email: input.email,
        });
        debug!(id = student.id, "created student");
        student
    }

    async fn get_student(&self, id: RecordId) -> StoreResult<Student> {
        self.tables
            .read()
            .await
            .students
            .get(id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Student, id))
    }

    async fn update_student(&self, id: RecordId, input: StudentInput) -> StoreResult<Student> {
        let updated = Student {
            id,
            major: input.major,
            email: input.email,
        };
        self.tables
            .write()
            .await
            .students
            .replace(id, updated)
            .ok_or_else(|| StoreError::not_found(EntityKind::Student, id))
    }

    async fn delete_student(&self, id: RecordId) -> StoreResult<()> {
        if self.tables.write().await.students.remove(id) {
            debug!(id, "deleted student");
            Ok(())
        } else {
            Err(StoreError::not_found(EntityKind::Student, id))
        }
    }

    async fn list_courses(&self) -> Vec<Course> {
        self.tables.read().await.courses.list()
    }

    async fn create_course(&self, input: CourseInput) -> Course {
        let course = self.tables.write().await.courses.insert_with(|id| Course {
            id,
            title: input.title,
            code: input.code,
            credits: input.credits,
        });
        debug!(id = course.id, "created course");
        course
    }

    async fn get_course(&self, id: RecordId) -> StoreResult<Course> {
        self.tables
            .read()
            .await
            .courses
            .get(id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Course, id))
    }

    async fn update_course(&self, id: RecordId, input: CourseInput) -> StoreResult<Course> {
        let updated = Course {
            id,
            title: input.title,
            code: input.code,
            credits: input.credits,
        };
        self.tables
            .write()
            .await
            .courses
            .replace(id, updated)
            .ok_or_else(|| StoreError::not_found(EntityKind::Course, id))
    }

    async fn delete_course(&self, id: RecordId) -> StoreResult<()> {
        if self.tables.write().await.courses.remove(id) {
            debug!(id, "deleted course");
            Ok(())
        } else {
            Err(StoreError::not_found(EntityKind::Course, id))
        }
    }

    async fn list_enrollments(&self) -> Vec<Enrollment> {
        self.tables.read().await.enrollments.list()
    }

    async fn create_enrollment(&self, input: EnrollmentInput) -> StoreResult<Enrollment> {
        let mut tables = self.tables.write().await;

        if !tables.students.contains(input.student_id) {
            return Err(StoreError::MissingReference {
                entity: EntityKind::Student,
                id: input.student_id,
            });
        }
        if !tables.courses.contains(input.course_id) {
            return Err(StoreError::MissingReference {
                entity: EntityKind::Course,
                id: input.course_id,
            });
        }

        let enrollment = tables.enrollments.insert_with(|id| Enrollment {
            id,
            student_id: input.student_id,
            course_id: input.course_id,
        });
        debug!(
            id = enrollment.id,
            student_id = enrollment.student_id,
            course_id = enrollment.course_id,
            "created enrollment"
        );
        Ok(enrollment)
    }

    async fn get_enrollment(&self, id: RecordId) -> StoreResult<Enrollment> {
        self.tables
            .read()
            .await
            .enrollments
            .get(id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Enrollment, id))
    }

    async fn delete_enrollment(&self, id: RecordId) -> StoreResult<()> {
        if self.tables.write().await.enrollments.remove(id) {
            debug!(id, "deleted enrollment");
            Ok(())
        } else {
            Err(StoreError::not_found(EntityKind::Enrollment, id))
        }
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
