/// Invitation code generation and validation
///
/// Invitation codes are read aloud and typed by relatives, so they use an
/// uppercase alphabet without look-alike characters (no `I`, `O`, `0`, `1`)
/// and are grouped in blocks of four: `K7QM-3XRT-W9PD`.
///
/// - Alphabet: 32 symbols, 12 random symbols per code (60 bits)
/// - Uniqueness is enforced by the `invitations_code_key` constraint
///
/// # Example
///
/// ```
/// use heritage_shared::auth::invitation_code::{generate_code, is_valid_format, normalize};
///
/// let code = generate_code();
/// assert!(is_valid_format(&code));
///
/// // User input is forgiving about case and surrounding whitespace
/// assert_eq!(normalize("  k7qm-3xrt-w9pd "), "K7QM-3XRT-W9PD");
/// ```

use rand::Rng;

/// Symbols a code is drawn from
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Symbols per group
const GROUP_LEN: usize = 4;

/// Number of groups
const GROUP_COUNT: usize = 3;

/// Length of a formatted code, separators included
pub const CODE_LENGTH: usize = GROUP_LEN * GROUP_COUNT + (GROUP_COUNT - 1);

/// Generates a new random invitation code
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(CODE_LENGTH);

    for group in 0..GROUP_COUNT {
        if group > 0 {
            code.push('-');
        }
        for _ in 0..GROUP_LEN {
            let idx = rng.gen_range(0..ALPHABET.len());
            code.push(ALPHABET[idx] as char);
        }
    }

    code
}

/// Canonical form of user-typed input
pub fn normalize(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Checks the grouping and alphabet of an already normalized code
pub fn is_valid_format(code: &str) -> bool {
    if code.len() != CODE_LENGTH {
        return false;
    }

    code.split('-').count() == GROUP_COUNT
        && code
            .split('-')
            .all(|group| group.len() == GROUP_LEN && group.bytes().all(|b| ALPHABET.contains(&b)))
}
