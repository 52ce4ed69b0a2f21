use bigdecimal::{BigDecimal, Zero};
use std::str::FromStr;

/// 解析用户输入的金额, 允许 "$1,234.50" 这类写法; 空串或非法返回 None
pub fn parse_amount(input: &str) -> Option<BigDecimal> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}

/// 两位小数, 四舍五入
pub fn format_amount(amount: &BigDecimal) -> String {
    amount.round(2).with_scale(2).to_string()
}

/// 带千分位和币种的展示格式: USD -> "$1,234.56", 其他 -> "1,234.56 EUR"
pub fn format_currency(amount: &BigDecimal, currency: &str) -> String {
    let plain = format_amount(&amount.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if *amount < BigDecimal::zero() { "-" } else { "" };
    if currency.eq_ignore_ascii_case("USD") {
        format!("{sign}${grouped}.{frac_part}")
    } else {
        format!("{sign}{grouped}.{frac_part} {}", currency.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formatted_input() {
        assert_eq!(parse_amount("$1,234.50"), Some(BigDecimal::from_str("1234.50").unwrap()));
        assert_eq!(parse_amount("  "), None);
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn formats_currency_with_grouping() {
        let v = BigDecimal::from_str("1234567.891").unwrap();
        assert_eq!(format_currency(&v, "USD"), "$1,234,567.89");
        assert_eq!(format_currency(&BigDecimal::from(530), "usd"), "$530.00");
        assert_eq!(format_currency(&BigDecimal::from(-20), "EUR"), "-20.00 EUR");
    }
}
