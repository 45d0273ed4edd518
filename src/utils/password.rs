use crate::error::{AppError, AppResult};

// 测试中降低 bcrypt 成本，避免哈希拖慢用例
#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// 对密码进行哈希
pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, HASH_COST)
        .map_err(|e| AppError::InternalError(format!("Password hashing failed: {e}")))
}

/// 校验密码；存储的哈希损坏时返回错误而非 false
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    bcrypt::verify(password, hash)
        .map_err(|e| AppError::InternalError(format!("Password verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hashed = hash_password("Password123").unwrap();
        assert!(hashed.starts_with("$2"));
        assert!(verify_password("Password123", &hashed).unwrap());
        assert!(!verify_password("Password124", &hashed).unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_an_error() {
        assert!(verify_password("Password123", "not-a-bcrypt-hash").is_err());
    }
}
