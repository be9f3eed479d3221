//! Field normalization for partner payloads.
//!
//! The CRM is lenient about how managers type customer data; the banks are not. Everything here
//! is pure string mangling so it can be exercised without any collaborator in place.

use std::sync::OnceLock;

use chrono::{Duration, Utc};
use regex::Regex;

use crate::db_types::GoodsLine;

const MD_COUNTRY_CODE: &str = "373";
const GOODS_LABEL_LIMIT: usize = 200;
const GOODS_FALLBACK: &str = "Товар";

fn cyrillic() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[а-яА-ЯёЁ]").expect("static pattern"))
}

fn iso_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static pattern"))
}

/// Banks require names in Latin script; the CRM happily stores Cyrillic.
pub fn contains_cyrillic(s: &str) -> bool {
    cyrillic().is_match(s)
}

/// Normalize a birthday to `YYYY-MM-DD`. Accepts already-normalized input, or day-first dates
/// separated by `.`, `-` or `/` with one- or two-digit day and month. Anything else passes
/// through untouched and is left for the bank to reject.
pub fn format_birthday(raw: &str) -> String {
    if iso_date().is_match(raw) {
        return raw.to_string();
    }
    let parts: Vec<&str> = raw.split(['.', '-', '/']).collect();
    if parts.len() == 3 {
        if parts[0].len() == 4 {
            return raw.to_string();
        }
        return format!("{}-{:0>2}-{:0>2}", parts[2], parts[1], parts[0]);
    }
    raw.to_string()
}

/// Moldovan number in E.164 form (`+373…`), as Microinvest and Iute require.
pub fn format_phone_e164(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with(MD_COUNTRY_CODE) {
        format!("+{digits}")
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("+{MD_COUNTRY_CODE}{rest}")
    } else {
        format!("+{MD_COUNTRY_CODE}{digits}")
    }
}

/// The same number in the local trunk form (`0…`) Easy Credit expects.
pub fn format_phone_local(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if let Some(rest) = digits.strip_prefix(MD_COUNTRY_CODE) {
        format!("0{rest}")
    } else if digits.starts_with('0') {
        digits
    } else {
        format!("0{digits}")
    }
}

/// A human-readable goods description for the bank, capped so the longest carts still fit the
/// partner's field limit.
pub fn goods_label(goods: &[GoodsLine]) -> String {
    let label = match goods {
        [] => return GOODS_FALLBACK.to_string(),
        [only] => only.name.clone(),
        many => many.iter().map(|g| g.name.as_str()).collect::<Vec<_>>().join(", "),
    };
    label.chars().take(GOODS_LABEL_LIMIT).collect()
}

/// Easy Credit wants the first installment date up front; the store policy is a fixed offset
/// from the submission day.
pub fn first_installment_date(days_from_now: i64) -> String {
    (Utc::now() + Duration::days(days_from_now)).format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    fn line(name: &str) -> GoodsLine {
        GoodsLine { name: name.to_string(), ..Default::default() }
    }

    #[test]
    fn birthday_day_first_forms() {
        assert_eq!(format_birthday("05.03.1990"), "1990-03-05");
        assert_eq!(format_birthday("5.3.1990"), "1990-03-05");
        assert_eq!(format_birthday("05-03-1990"), "1990-03-05");
        assert_eq!(format_birthday("05/03/1990"), "1990-03-05");
    }

    #[test]
    fn birthday_already_normalized_passes_through() {
        assert_eq!(format_birthday("1990-03-05"), "1990-03-05");
        assert_eq!(format_birthday("1990.03.05"), "1990.03.05");
        assert_eq!(format_birthday("yesterday"), "yesterday");
    }

    #[test]
    fn phone_e164_forms() {
        assert_eq!(format_phone_e164("069123456"), "+37369123456");
        assert_eq!(format_phone_e164("+373 69 123 456"), "+37369123456");
        assert_eq!(format_phone_e164("37369123456"), "+37369123456");
        assert_eq!(format_phone_e164("69123456"), "+37369123456");
    }

    #[test]
    fn phone_local_forms() {
        assert_eq!(format_phone_local("37369123456"), "069123456");
        assert_eq!(format_phone_local("+373 69 123 456"), "069123456");
        assert_eq!(format_phone_local("069123456"), "069123456");
        assert_eq!(format_phone_local("69123456"), "069123456");
    }

    #[test]
    fn cyrillic_detection() {
        assert!(contains_cyrillic("Иван"));
        assert!(contains_cyrillic("Ion Петров"));
        assert!(contains_cyrillic("ёлка"));
        assert!(!contains_cyrillic("Ion Popescu"));
        assert!(!contains_cyrillic("Ștefan Țurcanu"));
    }

    #[test]
    fn goods_labels() {
        assert_eq!(goods_label(&[]), "Товар");
        assert_eq!(goods_label(&[line("Frigider")]), "Frigider");
        assert_eq!(goods_label(&[line("Frigider"), line("Cuptor")]), "Frigider, Cuptor");
        let many: Vec<GoodsLine> = (0..40).map(|i| line(&format!("Produs numarul {i}"))).collect();
        assert_eq!(goods_label(&many).chars().count(), 200);
    }

    #[test]
    fn installment_date_is_iso_formatted() {
        let date = first_installment_date(20);
        assert_eq!(date.len(), 10);
        assert_eq!(&date[4..5], "-");
    }
}
