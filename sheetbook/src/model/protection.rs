//! Worksheet protection
//!
//! Protection is a declaration persisted in the package; the engine itself
//! does not block edits of locked cells. Whether a cell is locked lives in
//! its style ([`CellProtection`](super::CellProtection)).

use super::sheet_mut::WorksheetMut;
use crate::error::{Error, Result};
use base64::Engine;
use sha2::{Digest, Sha512};

/// What users may still do on a protected sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionOptions {
    pub select_locked_cells: bool,
    pub select_unlocked_cells: bool,
    pub format_cells: bool,
    pub format_columns: bool,
    pub format_rows: bool,
    pub insert_columns: bool,
    pub insert_rows: bool,
    pub insert_hyperlinks: bool,
    pub delete_columns: bool,
    pub delete_rows: bool,
    pub sort: bool,
    pub auto_filter: bool,
    pub pivot_tables: bool,
    pub edit_objects: bool,
    pub edit_scenarios: bool,
}

impl Default for ProtectionOptions {
    fn default() -> Self {
        Self {
            select_locked_cells: true,
            select_unlocked_cells: true,
            format_cells: false,
            format_columns: false,
            format_rows: false,
            insert_columns: false,
            insert_rows: false,
            insert_hyperlinks: false,
            delete_columns: false,
            delete_rows: false,
            sort: false,
            auto_filter: false,
            pivot_tables: false,
            edit_objects: false,
            edit_scenarios: false,
        }
    }
}

/// Stored password verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordHash {
    /// 16-bit legacy hash
    Legacy(u16),
    /// Iterated salted hash as written by newer producers
    Modern {
        algorithm: String,
        hash: String,
        salt: String,
        spin_count: u32,
    },
}

impl PasswordHash {
    pub fn matches(&self, password: &str) -> bool {
        match self {
            PasswordHash::Legacy(hash) => legacy_password_hash(password) == *hash,
            PasswordHash::Modern {
                algorithm,
                hash,
                salt,
                spin_count,
            } => {
                if !algorithm.eq_ignore_ascii_case("SHA-512") {
                    log::warn!("unsupported protection hash algorithm '{}'", algorithm);
                    return false;
                }
                sha512_password_hash(password, salt, *spin_count).as_deref() == Some(hash.as_str())
            }
        }
    }
}

/// Protection state of a worksheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetProtection {
    pub options: ProtectionOptions,
    pub password: Option<PasswordHash>,
}

impl SheetProtection {
    pub fn new(options: ProtectionOptions, password: Option<&str>) -> Self {
        Self {
            options,
            password: password
                .filter(|p| !p.is_empty())
                .map(|p| PasswordHash::Legacy(legacy_password_hash(p))),
        }
    }

    /// Does `password` unlock this protection?
    pub fn accepts(&self, password: Option<&str>) -> bool {
        match (&self.password, password) {
            (None, _) => true,
            (Some(hash), Some(password)) => hash.matches(password),
            (Some(_), None) => false,
        }
    }
}

/// The legacy 16-bit sheet password hash
pub fn legacy_password_hash(password: &str) -> u16 {
    let bytes = password.as_bytes();
    let rotate = |hash: u16| ((hash >> 14) & 0x01) | ((hash << 1) & 0x7fff);
    let mut hash: u16 = 0;
    for &b in bytes.iter().rev() {
        hash = rotate(hash) ^ b as u16;
    }
    hash = rotate(hash);
    hash ^ bytes.len() as u16 ^ 0xCE4B
}

/// Base64 SHA-512 of salt + UTF-16LE password, iterated `spin_count` times
fn sha512_password_hash(password: &str, salt_b64: &str, spin_count: u32) -> Option<String> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let salt = b64.decode(salt_b64).ok()?;
    let utf16: Vec<u8> = password.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let mut hash = Sha512::new().chain_update(&salt).chain_update(&utf16).finalize();
    for i in 0..spin_count {
        hash = Sha512::new()
            .chain_update(hash)
            .chain_update(i.to_le_bytes())
            .finalize();
    }
    Some(b64.encode(hash))
}

impl WorksheetMut<'_> {
    /// Protect the worksheet; an empty password is the same as none
    pub fn protect(&mut self, options: ProtectionOptions, password: Option<&str>) -> Result<()> {
        self.book.ensure_open()?;
        if let Some(current) = &self.protection
            && current.password.is_some()
        {
            return Err(Error::InvalidState(format!(
                "worksheet '{}' is already protected with a password",
                self.name
            )));
        }
        self.sheet_mut().protection = Some(SheetProtection::new(options, password));
        Ok(())
    }

    /// Remove protection; a wrong password fails with `InvalidPassword`
    pub fn unprotect(&mut self, password: Option<&str>) -> Result<()> {
        self.book.ensure_open()?;
        if let Some(current) = &self.protection
            && !current.accepts(password)
        {
            return Err(Error::InvalidPassword);
        }
        self.sheet_mut().protection = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_hash() {
        assert_eq!(legacy_password_hash("secret"), 0xDAA7);
        let protection = SheetProtection::new(ProtectionOptions::default(), Some("secret"));
        assert!(protection.accepts(Some("secret")));
        assert!(!protection.accepts(Some("Secret")));
        assert!(!protection.accepts(None));
    }

    #[test]
    fn test_modern_hash_verifies() {
        let salt = base64::engine::general_purpose::STANDARD.encode([7u8; 16]);
        let hash = sha512_password_hash("pw", &salt, 100).unwrap();
        let verifier = PasswordHash::Modern {
            algorithm: "SHA-512".to_string(),
            hash,
            salt,
            spin_count: 100,
        };
        assert!(verifier.matches("pw"));
        assert!(!verifier.matches("wp"));
    }

    #[test]
    fn test_no_password_accepts_anything() {
        let protection = SheetProtection::new(ProtectionOptions::default(), None);
        assert!(protection.accepts(None));
        assert!(protection.accepts(Some("x")));
    }

    #[test]
    fn test_protect_and_unprotect() {
        use crate::model::Workbook;
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.protect(ProtectionOptions::default(), Some("pw")).unwrap();
        assert!(ws.is_protected());
        assert!(matches!(ws.protect(ProtectionOptions::default(), None), Err(Error::InvalidState(_))));
        assert!(matches!(ws.unprotect(Some("nope")), Err(Error::InvalidPassword)));
        ws.unprotect(Some("pw")).unwrap();
        assert!(!ws.is_protected());
        ws.unprotect(None).unwrap();
    }
}
