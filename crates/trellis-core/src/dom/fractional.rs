//! Fractional index keys for ordering siblings
//!
//! A key is a string of base-62 digits (`0-9A-Za-z`, in ASCII order) read as
//! the fractional digits of a number in `(0, 1)`. Because the digit alphabet
//! is ASCII-sorted, plain string comparison agrees with numeric order. Keys
//! never end in `0`, which guarantees that a strictly-between key exists for
//! any two distinct keys: when two neighbours differ by one digit, the result
//! simply grows by another digit.

use super::FractionalIndexError;

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: usize = DIGITS.len();

fn digit_value(c: u8) -> Option<usize> {
    match c {
        b'0'..=b'9' => Some(usize::from(c - b'0')),
        b'A'..=b'Z' => Some(usize::from(c - b'A') + 10),
        b'a'..=b'z' => Some(usize::from(c - b'a') + 36),
        _ => None,
    }
}

/// Check that a key is well formed
pub fn validate_fractional_index(key: &str) -> Result<(), FractionalIndexError> {
    if key.is_empty() {
        return Err(FractionalIndexError::Empty);
    }
    if let Some(character) = key.chars().find(|c| !c.is_ascii() || digit_value(*c as u8).is_none()) {
        return Err(FractionalIndexError::InvalidDigit {
            key: key.to_string(),
            character,
        });
    }
    if key.ends_with('0') {
        return Err(FractionalIndexError::TrailingZero(key.to_string()));
    }
    Ok(())
}

/// Create a key that sorts strictly between `before` and `after`.
///
/// `None` stands for the open end of the range: `(None, Some(k))` yields a key
/// before `k`, `(Some(k), None)` one after `k`, and `(None, None)` the key used
/// for the first child of an empty slot.
///
/// # Example
///
/// ```
/// use trellis_core::dom::create_fractional_index;
///
/// let first = create_fractional_index(None, None).unwrap();
/// let second = create_fractional_index(Some(&first), None).unwrap();
/// let middle = create_fractional_index(Some(&first), Some(&second)).unwrap();
/// assert!(first < middle && middle < second);
/// ```
pub fn create_fractional_index(
    before: Option<&str>,
    after: Option<&str>,
) -> Result<String, FractionalIndexError> {
    if let Some(key) = before {
        validate_fractional_index(key)?;
    }
    if let Some(key) = after {
        validate_fractional_index(key)?;
    }
    if let (Some(low), Some(high)) = (before, after) {
        if low >= high {
            return Err(FractionalIndexError::OutOfOrder {
                before: low.to_string(),
                after: high.to_string(),
            });
        }
    }
    Ok(midpoint(
        before.unwrap_or_default().as_bytes(),
        after.map(str::as_bytes),
    ))
}

/// Digit-wise midpoint of two validated keys with `low < high`
fn midpoint(mut low: &[u8], mut high: Option<&[u8]>) -> String {
    let mut key = String::new();

    loop {
        if let Some(upper) = high {
            // Copy the shared prefix; missing digits of `low` count as '0'
            let shared = upper
                .iter()
                .enumerate()
                .take_while(|(i, digit)| low.get(*i).copied().unwrap_or(b'0') == **digit)
                .count();
            key.extend(upper[..shared].iter().map(|&b| char::from(b)));
            low = low.get(shared..).unwrap_or_default();
            high = Some(&upper[shared..]);
        }

        let low_digit = low.first().and_then(|&c| digit_value(c)).unwrap_or(0);
        let high_digit = high
            .and_then(|upper| upper.first())
            .and_then(|&c| digit_value(c))
            .unwrap_or(BASE);

        if high_digit > low_digit + 1 {
            key.push(char::from(DIGITS[(low_digit + high_digit + 1) / 2]));
            return key;
        }

        // Consecutive leading digits
        if let Some(upper) = high.filter(|upper| upper.len() > 1) {
            key.push(char::from(upper[0]));
            return key;
        }
        key.push(char::from(DIGITS[low_digit]));
        low = low.get(1..).unwrap_or_default();
        high = None;
    }
}
