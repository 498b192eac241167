//! Client-side field checks applied before anything is sent.

use crate::error::{ClientError, ClientResult};

pub const MIN_KEY_LEN: usize = 3;
pub const MIN_LOGIN_LEN: usize = 5;
pub const MIN_PASSWORD_LEN: usize = 6;

fn at_least(field: &'static str, value: &str, min: usize) -> ClientResult<()> {
    if value.chars().count() < min {
        return Err(ClientError::invalid(
            field,
            format!("length should be at least {min}"),
        ));
    }
    Ok(())
}

pub fn record_key(key: &str) -> ClientResult<()> {
    at_least("key", key, MIN_KEY_LEN)
}

pub fn login(login: &str) -> ClientResult<()> {
    at_least("login", login, MIN_LOGIN_LEN)
}

pub fn password(password: &str) -> ClientResult<()> {
    at_least("password", password, MIN_PASSWORD_LEN)
}

/// 13 to 19 digits passing the Luhn check; spaces and dashes are ignored.
pub fn card_number(number: &str) -> ClientResult<()> {
    let digits: Vec<u32> = number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .map(|c| c.to_digit(10))
        .collect::<Option<_>>()
        .ok_or_else(|| ClientError::invalid("card number", "must contain only digits"))?;

    if !(13..=19).contains(&digits.len()) {
        return Err(ClientError::invalid(
            "card number",
            "must have 13 to 19 digits",
        ));
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| match (i % 2 == 1, d * 2) {
            (true, doubled) if doubled > 9 => doubled - 9,
            (true, doubled) => doubled,
            (false, _) => d,
        })
        .sum();
    if sum % 10 != 0 {
        return Err(ClientError::invalid("card number", "failed checksum"));
    }
    Ok(())
}

/// `MM/YY`
pub fn card_expiration(expiration: &str) -> ClientResult<()> {
    let invalid = || ClientError::invalid("expiration", "must look like MM/YY");
    let (month, year) = expiration.split_once('/').ok_or_else(invalid)?;
    let two_digits = |part: &str| part.len() == 2 && part.chars().all(|c| c.is_ascii_digit());
    if !two_digits(month) || !two_digits(year) {
        return Err(invalid());
    }
    match month.parse::<u8>() {
        Ok(1..=12) => Ok(()),
        _ => Err(invalid()),
    }
}

pub fn card_cvv(cvv: &str) -> ClientResult<()> {
    if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(ClientError::invalid("cvv", "must be 3 or 4 digits"));
    }
    Ok(())
}

pub fn non_empty(field: &'static str, value: &str) -> ClientResult<()> {
    if value.trim().is_empty() {
        return Err(ClientError::invalid(field, "must not be empty"));
    }
    Ok(())
}
