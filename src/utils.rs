// ABOUTME: Identifier validation and quoting helpers for generated SQL
// ABOUTME: Keeps table and column names safe to splice into statements

use crate::error::{Result, SyncError};

/// Maximum identifier length accepted (MySQL limit is 64 characters)
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Validate a table or column name before it is spliced into SQL.
///
/// Identifiers are always quoted when used, so the rules only reject names
/// that cannot be quoted safely or could never exist:
/// - empty or whitespace-only
/// - longer than [`MAX_IDENTIFIER_LEN`] characters
/// - containing control characters (including NUL)
///
/// # Examples
///
/// ```
/// # use rowsync::utils::validate_identifier;
/// assert!(validate_identifier("orders").is_ok());
/// assert!(validate_identifier("order items").is_ok());
/// assert!(validate_identifier("").is_err());
/// assert!(validate_identifier("bad\0name").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        return Err(SyncError::validation(
            "Identifier cannot be empty or whitespace-only",
        ));
    }

    let len = identifier.chars().count();
    if len > MAX_IDENTIFIER_LEN {
        return Err(SyncError::validation(format!(
            "Identifier '{}' exceeds maximum length of {} characters (got {})",
            sanitize_identifier(identifier),
            MAX_IDENTIFIER_LEN,
            len
        )));
    }

    if let Some((i, c)) = identifier.char_indices().find(|(_, c)| c.is_control()) {
        return Err(SyncError::validation(format!(
            "Identifier '{}' contains control character \\x{:02x} at position {}",
            sanitize_identifier(identifier),
            c as u32,
            i
        )));
    }

    Ok(())
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length to prevent log injection.
/// This is for display purposes only.
///
/// # Examples
///
/// ```
/// # use rowsync::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Quote an identifier with double quotes (SQLite, ANSI SQL)
///
/// Escapes embedded quotes by doubling them.
pub fn quote_ident(identifier: &str) -> String {
    quote_with(identifier, '"')
}

/// Quote a MySQL identifier (database, table, column)
///
/// MySQL uses backticks for identifier quoting. Escapes embedded backticks
/// by doubling them.
///
/// # Examples
///
/// ```
/// use rowsync::utils::quote_mysql_ident;
/// assert_eq!(quote_mysql_ident("users"), "`users`");
/// assert_eq!(quote_mysql_ident("user`name"), "`user``name`");
/// ```
pub fn quote_mysql_ident(identifier: &str) -> String {
    quote_with(identifier, '`')
}

fn quote_with(identifier: &str, quote: char) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push(quote);
    for ch in identifier.chars() {
        if ch == quote {
            quoted.push(quote);
        }
        quoted.push(ch);
    }
    quoted.push(quote);
    quoted
}

/// Count positional `?` placeholders in a SQL fragment, skipping quoted text.
///
/// # Examples
///
/// ```
/// # use rowsync::utils::count_placeholders;
/// assert_eq!(count_placeholders("email = ? AND tenant = ?"), 2);
/// assert_eq!(count_placeholders("note = 'why?' AND id = ?"), 1);
/// ```
pub fn count_placeholders(fragment: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;

    for ch in fragment.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '?' => count += 1,
                _ => {}
            },
        }
    }

    count
}
