//! 通用工具函数

/// 验证码固定位数
pub const CONSENT_CODE_LENGTH: usize = 6;

/// 判断是否为合法的验证码格式：恰好6位ASCII数字
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == CONSENT_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// 对手机号做脱敏处理，仅保留末4位数字
///
/// 不超过4位数字的号码全部遮盖，脱敏结果不会等于完整号码。
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        return "*".repeat(digits.len());
    }

    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(digits.len() - 4), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_well_formed_code() {
        assert!(is_well_formed_code("123456"));
        assert!(is_well_formed_code("000000"));
        assert!(!is_well_formed_code("12345"));
        assert!(!is_well_formed_code("1234567"));
        assert!(!is_well_formed_code("12345a"));
        assert!(!is_well_formed_code(" 123456"));
        assert!(!is_well_formed_code("１２３４５６"));
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+91 98765 43210"), "********3210");
        assert_eq!(mask_phone("123"), "***");
        assert_eq!(mask_phone("1234"), "****");
        assert_eq!(mask_phone("12345"), "*2345");
        assert_eq!(mask_phone(""), "");
    }
}
