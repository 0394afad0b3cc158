use serde::{Deserialize, Serialize};

/// Negative ids are accepted as input and never match a record.
pub type RecordId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Student {
    pub id: RecordId,
    pub major: String,
    pub email: String,
}

/// Student fields accepted on create and update. Any `id` in the request body
/// is ignored; the store assigns ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudentInput {
    pub major: String,
    pub email: String,
}

impl StudentInput {
    pub fn new(major: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            major: major.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Course {
    pub id: RecordId,
    pub title: String,
    pub code: String,
    pub credits: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CourseInput {
    pub title: String,
    pub code: String,
    pub credits: i64,
}

impl CourseInput {
    pub fn new(title: impl Into<String>, code: impl Into<String>, credits: i64) -> Self {
        Self {
            title: title.into(),
            code: code.into(),
            credits,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Enrollment {
    pub id: RecordId,
    pub student_id: RecordId,
    pub course_id: RecordId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrollmentInput {
    pub student_id: RecordId,
    pub course_id: RecordId,
}

impl EnrollmentInput {
    pub fn new(student_id: RecordId, course_id: RecordId) -> Self {
        Self {
            student_id,
            course_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Student,
    Course,
    Enrollment,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Student => write!(f, "Student"),
            EntityKind::Course => write!(f, "Course"),
            EntityKind::Enrollment => write!(f, "Enrollment"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

impl Token {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "bearer".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_student_input_ignores_client_id() {
        let input: StudentInput = serde_json::from_value(json!({
            "id": 42,
            "major": "Physics",
            "email": "ada@example.edu"
        }))
        .unwrap();
        assert_eq!(input, StudentInput::new("Physics", "ada@example.edu"));
    }

    #[test]
    fn test_course_input_requires_credits() {
        let result: Result<CourseInput, _> = serde_json::from_value(json!({
            "title": "Compilers",
            "code": "CS-420"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_enrollment_field_names() {
        let enrollment = Enrollment {
            id: 1,
            student_id: 2,
            course_id: 3,
        };
        let value = serde_json::to_value(enrollment).unwrap();
        assert_eq!(value, json!({"id": 1, "student_id": 2, "course_id": 3}));
    }

    #[test]
    fn test_bearer_token() {
        let token = Token::bearer("abc");
        assert_eq!(token.token_type, "bearer");
        assert_eq!(
            serde_json::to_value(&token).unwrap(),
            json!({"access_token": "abc", "token_type": "bearer"})
        );
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::Student.to_string(), "Student");
        assert_eq!(EntityKind::Course.to_string(), "Course");
        assert_eq!(EntityKind::Enrollment.to_string(), "Enrollment");
    }
}
