use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;

use crate::domain::{
    Credentials, Language, LoginForm, Registration, RegistrationForm, SnippetDraft, SnippetForm,
    SnippetPatch,
};
use crate::error::ValidationErrors;

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const CODE_MAX_BYTES: usize = 50_000;
pub const TAG_MAX_CHARS: usize = 50;
pub const MAX_TAGS: usize = 10;
pub const NAME_MAX_CHARS: usize = 100;
pub const EMAIL_MAX_CHARS: usize = 255;
pub const PASSWORD_MIN_CHARS: usize = 8;

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
            .expect("compile email regex");
    static ref UPPERCASE: Regex = Regex::new(r"[A-Z]").expect("compile uppercase regex");
    static ref LOWERCASE: Regex = Regex::new(r"[a-z]").expect("compile lowercase regex");
    static ref DIGIT: Regex = Regex::new(r"[0-9]").expect("compile digit regex");
    static ref SPECIAL: Regex = Regex::new(r"[^A-Za-z0-9]").expect("compile special character regex");
}

/// Schema checks for account and snippet input.
///
/// Every function trims string fields before checking lengths, collects all
/// field failures, and returns the normalized value only when nothing failed.
pub struct Validator;

impl Validator {
    pub fn login(form: &LoginForm) -> Result<Credentials, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let email = Self::email(&mut errors, &form.email);
        if form.password.is_empty() {
            errors.push("password", "Password is required");
        }

        errors.into_result(Credentials {
            email,
            password: form.password.clone(),
        })
    }

    pub fn registration(form: &RegistrationForm) -> Result<Registration, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = form.name.trim().to_string();
        if name.is_empty() {
            errors.push("name", "Name is required");
        } else if name.chars().count() > NAME_MAX_CHARS {
            errors.push("name", "Name must be less than 100 characters");
        }

        let email = Self::email(&mut errors, &form.email);

        let password = &form.password;
        if password.chars().count() < PASSWORD_MIN_CHARS {
            errors.push("password", "Password must be at least 8 characters");
        }
        if !UPPERCASE.is_match(password) {
            errors.push("password", "Password must contain at least one uppercase letter");
        }
        if !LOWERCASE.is_match(password) {
            errors.push("password", "Password must contain at least one lowercase letter");
        }
        if !DIGIT.is_match(password) {
            errors.push("password", "Password must contain at least one number");
        }
        if !SPECIAL.is_match(password) {
            errors.push("password", "Password must contain at least one special character");
        }

        if form.confirm_password.is_empty() {
            errors.push("confirm_password", "Please confirm your password");
        } else if form.confirm_password != form.password {
            errors.push("confirm_password", "Passwords do not match");
        }

        errors.into_result(Registration {
            name,
            email,
            password: password.clone(),
        })
    }

    pub fn snippet(form: &SnippetForm) -> Result<SnippetDraft, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = Self::title(&mut errors, &form.title);
        let description = Self::description(&mut errors, &form.description);
        let code = Self::code(&mut errors, &form.code);
        let language = Language::from_str(form.language.trim());
        if language.is_err() {
            errors.push("language", "Please select a supported language");
        }
        let tags = Self::tags(&mut errors, &form.tags);

        match language {
            Ok(language) => errors.into_result(SnippetDraft {
                title,
                description,
                code,
                language,
                tags,
            }),
            Err(_) => Err(errors),
        }
    }

    /// Validates the fields present in a partial update and normalizes them
    pub fn patch(patch: &SnippetPatch) -> Result<SnippetPatch, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let normalized = SnippetPatch {
            title: patch.title.as_deref().map(|t| Self::title(&mut errors, t)),
            description: patch
                .description
                .as_deref()
                .map(|d| Self::description(&mut errors, d)),
            code: patch.code.as_deref().map(|c| Self::code(&mut errors, c)),
            language: patch.language,
            tags: patch.tags.as_deref().map(|t| Self::tags(&mut errors, t)),
            is_favorite: patch.is_favorite,
        };

        errors.into_result(normalized)
    }

    fn email(errors: &mut ValidationErrors, raw: &str) -> String {
        let email = raw.trim().to_string();
        if email.is_empty() {
            errors.push("email", "Email is required");
        } else {
            if !EMAIL.is_match(&email) {
                errors.push("email", "Invalid email format");
            }
            if email.chars().count() > EMAIL_MAX_CHARS {
                errors.push("email", "Email must be less than 255 characters");
            }
        }
        email
    }

    fn title(errors: &mut ValidationErrors, raw: &str) -> String {
        let title = raw.trim().to_string();
        if title.is_empty() {
            errors.push("title", "Title is required");
        } else if title.chars().count() > TITLE_MAX_CHARS {
            errors.push("title", "Title must be less than 200 characters");
        }
        title
    }

    fn description(errors: &mut ValidationErrors, raw: &str) -> String {
        let description = raw.trim().to_string();
        if description.chars().count() > DESCRIPTION_MAX_CHARS {
            errors.push("description", "Description must be less than 1000 characters");
        }
        description
    }

    fn code(errors: &mut ValidationErrors, raw: &str) -> String {
        let code = raw.trim().to_string();
        if code.is_empty() {
            errors.push("code", "Code is required");
        } else if code.len() > CODE_MAX_BYTES {
            errors.push("code", "Code exceeds 50KB limit");
        }
        code
    }

    fn tags(errors: &mut ValidationErrors, raw: &[String]) -> Vec<String> {
        if raw.len() > MAX_TAGS {
            errors.push("tags", "Maximum 10 tags allowed");
        }

        raw.iter()
            .map(|tag| {
                let tag = tag.trim().to_string();
                if tag.is_empty() {
                    errors.push("tags", "Tag cannot be empty");
                } else if tag.chars().count() > TAG_MAX_CHARS {
                    errors.push("tags", "Tag must be less than 50 characters");
                }
                tag
            })
            .collect()
    }
}
