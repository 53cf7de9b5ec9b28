// Form validation - field rules checked before any store or identity call

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const EMAIL_MAX_LEN: usize = 100;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 50;
pub const TITLE_MIN_LEN: usize = 2;
pub const TITLE_MAX_LEN: usize = 100;
pub const CONTENT_MIN_LEN: usize = 10;
pub const CONTENT_MAX_LEN: usize = 2000;
pub const COMMENT_MAX_LEN: usize = 50;
pub const MAX_IMAGES_PER_POST: usize = 3;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));
static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]").expect("letter pattern"));
static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").expect("digit pattern"));
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[!@#$%^&*()_+\-=\[\]{};':"\\|,.<>/?~`]"#).expect("symbol pattern")
});

/// Field name to messages, in the order the rules fired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.fields.get(name).map(|v| v.as_slice())
    }

    pub fn first_message(&self) -> Option<&str> {
        self.fields
            .values()
            .next()
            .and_then(|msgs| msgs.first())
            .map(|m| m.as_str())
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, msgs)| format!("{}: {}", field, msgs.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Only the first failing rule per field is reported, like a schema resolver.
fn check_email(errors: &mut ValidationErrors, email: &str, enforce_max: bool) {
    if email.is_empty() {
        errors.add("email", "이메일을 입력해주세요");
    } else if !EMAIL_RE.is_match(email) {
        errors.add("email", "올바른 이메일 형식이 아닙니다");
    } else if enforce_max && char_len(email) > EMAIL_MAX_LEN {
        errors.add("email", "이메일은 최대 100자까지 입력 가능합니다");
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_email(&mut errors, &self.email, true);

        let password = &self.password;
        if password.is_empty() {
            errors.add("password", "비밀번호를 입력해주세요");
        } else if char_len(password) < PASSWORD_MIN_LEN {
            errors.add("password", "비밀번호는 최소 8자 이상이어야 합니다");
        } else if char_len(password) > PASSWORD_MAX_LEN {
            errors.add("password", "비밀번호는 최대 50자까지 입력 가능합니다");
        } else if !(LETTER_RE.is_match(password)
            && DIGIT_RE.is_match(password)
            && SYMBOL_RE.is_match(password))
        {
            errors.add("password", "비밀번호는 영문, 숫자, 특수문자를 포함해야 합니다");
        }

        if self.confirm_password.is_empty() {
            errors.add("confirm_password", "비밀번호 확인을 입력해주세요");
        } else if self.confirm_password != self.password {
            errors.add("confirm_password", "비밀번호가 일치하지 않습니다");
        }

        errors.into_result()
    }

    /// Explicit display name, or the local part of the email.
    pub fn resolved_display_name(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_email(&mut errors, &self.email, false);
        if self.password.is_empty() {
            errors.add("password", "비밀번호를 입력해주세요");
        }
        errors.into_result()
    }
}

fn check_title(errors: &mut ValidationErrors, title: &str) {
    if title.is_empty() {
        errors.add("title", "제목을 입력해주세요");
    } else if char_len(title) < TITLE_MIN_LEN {
        errors.add("title", "제목은 최소 2자 이상이어야 합니다");
    } else if char_len(title) > TITLE_MAX_LEN {
        errors.add("title", "제목은 최대 100자까지 입력 가능합니다");
    }
}

fn check_content(errors: &mut ValidationErrors, content: &str) {
    if content.is_empty() {
        errors.add("content", "내용을 입력해주세요");
    } else if char_len(content) < CONTENT_MIN_LEN {
        errors.add("content", "내용은 최소 10자 이상이어야 합니다");
    } else if char_len(content) > CONTENT_MAX_LEN {
        errors.add("content", "내용은 최대 2000자까지 입력 가능합니다");
    }
}

fn check_images(errors: &mut ValidationErrors, images: &[String]) {
    if images.len() > MAX_IMAGES_PER_POST {
        errors.add("images", "이미지는 최대 3개까지만 업로드할 수 있습니다.");
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl PostForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_title(&mut errors, &self.title);
        check_content(&mut errors, &self.content);
        check_images(&mut errors, &self.images);
        errors.into_result()
    }
}

/// Partial post update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdateForm {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

impl PostUpdateForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(title) = &self.title {
            check_title(&mut errors, title);
        }
        if let Some(content) = &self.content {
            check_content(&mut errors, content);
        }
        if let Some(images) = &self.images {
            check_images(&mut errors, images);
        }
        errors.into_result()
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.images.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentForm {
    pub content: String,
}

impl CommentForm {
    /// Validates the trimmed content and returns it.
    pub fn validate(&self) -> Result<String, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let content = self.content.trim();
        if content.is_empty() {
            errors.add("content", "댓글을 입력해주세요");
        } else if char_len(content) > COMMENT_MAX_LEN {
            errors.add("content", "댓글은 50자 이하로 입력해주세요");
        }
        errors.into_result().map(|_| content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, password: &str, confirm: &str) -> RegisterForm {
        RegisterForm {
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
            display_name: None,
        }
    }

    #[test]
    fn test_register_accepts_strong_password() {
        let form = register("kim@example.com", "abcd123!", "abcd123!");
        assert!(form.validate().is_ok());
        assert_eq!(form.resolved_display_name(), "kim");
    }

    #[test]
    fn test_register_password_rules() {
        let short = register("a@b.co", "ab1!", "ab1!").validate().unwrap_err();
        assert_eq!(
            short.field("password").unwrap()[0],
            "비밀번호는 최소 8자 이상이어야 합니다"
        );

        let no_symbol = register("a@b.co", "abcd1234", "abcd1234")
            .validate()
            .unwrap_err();
        assert_eq!(
            no_symbol.field("password").unwrap()[0],
            "비밀번호는 영문, 숫자, 특수문자를 포함해야 합니다"
        );

        let long = "a1!".repeat(17);
        let too_long = register("a@b.co", &long, &long).validate().unwrap_err();
        assert_eq!(
            too_long.field("password").unwrap()[0],
            "비밀번호는 최대 50자까지 입력 가능합니다"
        );
    }

    #[test]
    fn test_register_confirm_mismatch_and_email() {
        let errors = register("not-an-email", "abcd123!", "abcd123?")
            .validate()
            .unwrap_err();
        assert_eq!(errors.field("email").unwrap()[0], "올바른 이메일 형식이 아닙니다");
        assert_eq!(
            errors.field("confirm_password").unwrap()[0],
            "비밀번호가 일치하지 않습니다"
        );

        let long_email = format!("{}@example.com", "a".repeat(95));
        let errors = register(&long_email, "abcd123!", "abcd123!")
            .validate()
            .unwrap_err();
        assert_eq!(
            errors.field("email").unwrap()[0],
            "이메일은 최대 100자까지 입력 가능합니다"
        );
    }

    #[test]
    fn test_login_requires_fields_only() {
        let form = LoginForm {
            email: "kim@example.com".to_string(),
            password: "x".to_string(),
        };
        assert!(form.validate().is_ok());

        let empty = LoginForm {
            email: String::new(),
            password: String::new(),
        };
        let errors = empty.validate().unwrap_err();
        assert_eq!(errors.field("email").unwrap()[0], "이메일을 입력해주세요");
        assert_eq!(errors.field("password").unwrap()[0], "비밀번호를 입력해주세요");
    }

    #[test]
    fn test_post_content_boundary() {
        let nine = PostForm {
            title: "Hello".to_string(),
            content: "123456789".to_string(),
            images: vec![],
        };
        let errors = nine.validate().unwrap_err();
        assert_eq!(
            errors.field("content").unwrap()[0],
            "내용은 최소 10자 이상이어야 합니다"
        );

        let ten = PostForm {
            content: "1234567890".to_string(),
            ..nine
        };
        assert!(ten.validate().is_ok());
    }

    #[test]
    fn test_post_title_and_image_limits() {
        let form = PostForm {
            title: "H".to_string(),
            content: "long enough content".to_string(),
            images: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.field("title").unwrap()[0], "제목은 최소 2자 이상이어야 합니다");
        assert_eq!(
            errors.field("images").unwrap()[0],
            "이미지는 최대 3개까지만 업로드할 수 있습니다."
        );
    }

    #[test]
    fn test_comment_is_trimmed_and_bounded() {
        let form = CommentForm {
            content: "   좋은 글이네요   ".to_string(),
        };
        assert_eq!(form.validate().unwrap(), "좋은 글이네요");

        let blank = CommentForm {
            content: "    ".to_string(),
        };
        assert_eq!(
            blank.validate().unwrap_err().field("content").unwrap()[0],
            "댓글을 입력해주세요"
        );

        let fifty = CommentForm {
            content: "가".repeat(50),
        };
        assert!(fifty.validate().is_ok());

        let fifty_one = CommentForm {
            content: "가".repeat(51),
        };
        assert_eq!(
            fifty_one.validate().unwrap_err().field("content").unwrap()[0],
            "댓글은 50자 이하로 입력해주세요"
        );
    }

    #[test]
    fn test_partial_update_validates_present_fields() {
        assert!(PostUpdateForm::default().validate().is_ok());
        assert!(PostUpdateForm::default().is_empty());

        let update = PostUpdateForm {
            content: Some("short".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}
