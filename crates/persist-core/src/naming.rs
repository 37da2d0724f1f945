//! Naming conventions shared by the whole engine.
//!
//! Table, column and join-table names are pure functions of model type and
//! field names, so two independent callers always agree on an identifier.

/// Primary key column of every table.
pub const ID: &str = "id";
/// Epoch-millis creation stamp.
pub const CREATED_AT: &str = "created_at";
/// Epoch-millis modification stamp.
pub const UPDATED_AT: &str = "updated_at";
/// Calendar-date creation stamp.
pub const CREATED_ON: &str = "created_on";
/// Calendar-date modification stamp.
pub const UPDATED_ON: &str = "updated_on";

/// Convert `camelCase` / `PascalCase` to `snake_case`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Naive English pluralization, good enough for table names.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_ascii_lowercase();
    if lower.ends_with('y') {
        let before = lower.chars().rev().nth(1);
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", &word[..word.len() - 1]);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Table name for a model type: `Category` → `categories`.
pub fn table_name(model_type: &str) -> String {
    pluralize(&snake_case(model_type))
}

/// Column name for a field: `accountType` → `account_type`.
pub fn column_name(field: &str) -> String {
    snake_case(field)
}

/// Join table backing a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinTable {
    /// Join table name.
    pub table: String,
    /// Column holding the owning side's id.
    pub owner_column: String,
    /// Column holding the member side's id.
    pub member_column: String,
}

impl JoinTable {
    /// Derive the join table for `owner_table.owner_column` ↔ `member_table.member_column`.
    ///
    /// The table name does not depend on which side asks; each column is named
    /// after the side whose ids it stores.
    pub fn derive(
        owner_table: &str,
        owner_column: &str,
        member_table: &str,
        member_column: &str,
    ) -> Self {
        let owner = format!("{owner_table}__{owner_column}");
        let member = format!("{member_table}__{member_column}");
        let table = if owner <= member {
            format!("{owner}___{member}")
        } else {
            format!("{member}___{owner}")
        };
        Self {
            table,
            owner_column: owner,
            member_column: member,
        }
    }

    /// The same join table seen from the member side.
    pub fn flipped(&self) -> Self {
        Self {
            table: self.table.clone(),
            owner_column: self.member_column.clone(),
            member_column: self.owner_column.clone(),
        }
    }
}

/// Whether a column is one of the automatic stamp columns.
pub fn is_stamp_column(column: &str) -> bool {
    matches!(column, CREATED_AT | UPDATED_AT | CREATED_ON | UPDATED_ON)
}
