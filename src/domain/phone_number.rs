use validator::validate_phone;

/// E.164 phone number. Bare US numbers are normalised on parse.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(phone_number: String) -> Result<PhoneNumber, String> {
        let normalized = normalize_us_number(phone_number.trim());

        // Phone parsing maps letters to keypad digits, so they are rejected up front.
        let only_digits = normalized
            .strip_prefix('+')
            .map(|digits| digits.chars().all(|char| char.is_ascii_digit()))
            .unwrap_or(false);

        if !only_digits || !validate_phone(normalized.as_str()) {
            return Err(format!("{} is not a valid phone number", phone_number));
        }

        Ok(Self(normalized))
    }
}

fn normalize_us_number(phone_number: &str) -> String {
    let all_digits = phone_number.chars().all(|char| char.is_ascii_digit());

    match phone_number.len() {
        10 if all_digits => format!("+1{}", phone_number),
        11 if all_digits => format!("+{}", phone_number),
        _ => phone_number.to_string(),
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
