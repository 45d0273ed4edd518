//! 请求字段校验
//!
//! 各函数返回规范化后的值，失败时返回字段级错误，由调用方汇总后统一返回。

use regex::Regex;
use std::sync::LazyLock;

use crate::error::FieldError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("valid email regex")
});

/// `+` 只允许出现在开头
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()\-]+$").expect("valid phone regex"));

static CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{3}$").expect("valid currency regex"));

const EMAIL_MAX_LEN: usize = 254;
const PHONE_MIN_LEN: usize = 7;
const PHONE_MAX_LEN: usize = 20;

/// 文本长度校验（按字符计数，首尾空白不计）
pub fn validate_text(field: &str, value: &str, min: usize, max: usize) -> Result<String, FieldError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(FieldError::new(
            field,
            format!("must be between {min} and {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// 参与者姓名: 2-100 字符
pub fn validate_person_name(field: &str, value: &str) -> Result<String, FieldError> {
    validate_text(field, value, 2, 100)
}

/// 邮箱格式校验，返回小写形式
pub fn validate_email(field: &str, value: &str) -> Result<String, FieldError> {
    let trimmed = value.trim();
    let valid = trimmed.len() <= EMAIL_MAX_LEN
        && EMAIL_RE.is_match(trimmed);
    if !valid {
        return Err(FieldError::new(field, "must be a valid email address"));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// 手机号可选；空字符串视为未填写
pub fn validate_phone(field: &str, value: Option<&str>) -> Result<Option<String>, FieldError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let len = raw.chars().count();
    let digits = raw.chars().filter(char::is_ascii_digit).count();
    let valid = (PHONE_MIN_LEN..=PHONE_MAX_LEN).contains(&len)
        && digits >= PHONE_MIN_LEN
        && PHONE_RE.is_match(raw);
    if !valid {
        return Err(FieldError::new(
            field,
            "must be 7-20 characters of digits, spaces or + ( ) - with at least 7 digits",
        ));
    }
    Ok(Some(raw.to_string()))
}

/// 密码强度: 8-128 字符，需包含大小写字母和数字
pub fn validate_password(field: &str, value: &str) -> Result<(), FieldError> {
    let len = value.chars().count();
    if !(8..=128).contains(&len) {
        return Err(FieldError::new(field, "must be between 8 and 128 characters"));
    }
    let classes = [
        value.chars().any(char::is_lowercase),
        value.chars().any(char::is_uppercase),
        value.chars().any(|c| c.is_ascii_digit()),
    ];
    if classes.contains(&false) {
        return Err(FieldError::new(
            field,
            "must contain upper-case and lower-case letters and a digit",
        ));
    }
    Ok(())
}

/// ISO 4217 币种代码，返回小写
pub fn validate_currency(field: &str, value: &str) -> Result<String, FieldError> {
    let lower = value.trim().to_ascii_lowercase();
    if !CURRENCY_RE.is_match(&lower) {
        return Err(FieldError::new(field, "must be a 3-letter ISO currency code"));
    }
    Ok(lower)
}

/// 收集校验结果，保留成功值
pub fn collect<T>(errors: &mut Vec<FieldError>, result: Result<T, FieldError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_person_name() {
        assert_eq!(validate_person_name("name", "  Ana ").unwrap(), "Ana");
        assert!(validate_person_name("name", "A").is_err());
        assert!(validate_person_name("name", "   ").is_err());
        assert!(validate_person_name("name", &"x".repeat(101)).is_err());
        assert!(validate_person_name("name", &"ñ".repeat(100)).is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email("email", " Maria@Example.COM ").unwrap(),
            "maria@example.com"
        );
        assert!(validate_email("email", "user.name+tag@sub.example.es").is_ok());
        assert!(validate_email("email", "no-at-sign").is_err());
        assert!(validate_email("email", "a@b").is_err());
        assert!(validate_email("email", "a@-bad.com").is_err());
        assert!(validate_email("email", "").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert_eq!(validate_phone("phone", None).unwrap(), None);
        assert_eq!(validate_phone("phone", Some("  ")).unwrap(), None);
        assert_eq!(
            validate_phone("phone", Some("+34 600 123 456")).unwrap(),
            Some("+34 600 123 456".to_string())
        );
        assert_eq!(
            validate_phone("phone", Some(" (55) 1234-5678 ")).unwrap(),
            Some("(55) 1234-5678".to_string())
        );
        assert!(validate_phone("phone", Some("+1 (212) 555-0100")).is_ok());
        assert!(validate_phone("phone", Some("6001234")).is_ok());
        assert!(validate_phone("phone", Some("12345")).is_err());
        assert!(validate_phone("phone", Some("phone-me")).is_err());
        // 字符合法但数字不足
        assert!(validate_phone("phone", Some("(1) - - - -")).is_err());
        // + 只能在开头
        assert!(validate_phone("phone", Some("34+600123456")).is_err());
        // 超过 20 个字符
        assert!(validate_phone("phone", Some("+34 600 123 456 789 01")).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password", "Password123").is_ok());
        assert!(validate_password("password", "password123").is_err());
        assert!(validate_password("password", "PASSWORD123").is_err());
        assert!(validate_password("password", "Password").is_err());
        assert!(validate_password("password", "Pass123").is_err());
        assert!(validate_password("password", &format!("Aa1{}", "x".repeat(126))).is_err());
    }

    #[test]
    fn test_validate_currency() {
        assert_eq!(validate_currency("currency", "EUR").unwrap(), "eur");
        assert!(validate_currency("currency", "euro").is_err());
        assert!(validate_currency("currency", "e1r").is_err());
    }

    #[test]
    fn test_collect() {
        let mut errors = Vec::new();
        assert_eq!(collect(&mut errors, validate_person_name("name", "Ana")), Some("Ana".into()));
        assert_eq!(collect(&mut errors, validate_email("email", "bad")), None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "email");
    }
}
