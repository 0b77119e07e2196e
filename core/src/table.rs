//! Discovery and scanning of the injected hash table.
//!
//! The guest owner places the table in protected memory before the guest's
//! first instruction runs. The layout is packed, little-endian, and
//! self-describing:
//!
//! ```text
//! root  = guid:16B | len:2B LE            len covers the header itself
//! entry = guid:16B | len:2B LE | payload:(len - 18)B
//! ```

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::guid::{Guid, HASH_TABLE_GUID};

/// Size of the packed `guid + u16 length` header shared by the root record
/// and every entry.
pub const HEADER_SIZE: usize = Guid::SIZE + 2;

/// Static boot configuration naming the protected region that may hold the
/// table. An all-zero region means verification was not requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRegion {
    /// Guest-physical base address of the region.
    pub base: u64,
    /// Size of the region in bytes.
    pub size: u32,
}

/// Immutable view of a discovered hash table.
///
/// Borrows externally owned memory; nothing here copies, mutates or frees the
/// underlying bytes. Discovery happens once per boot stage and the view stays
/// valid for the rest of it.
#[derive(Debug, Clone, Copy)]
pub struct HashTable<'a> {
    /// Entry records, starting immediately after the root header.
    entries: &'a [u8],
    /// Root-header fault detected at discovery; poisons every scan.
    malformed: Option<ParseError>,
}

impl<'a> HashTable<'a> {
    /// Inspect `region` for a hash table.
    ///
    /// `None` means no table is present: the region is shorter than one
    /// header or the root identifier does not match. Absence is an expected
    /// deployment mode, not an error.
    pub fn parse(region: &'a [u8]) -> Option<HashTable<'a>> {
        if region.len() < HEADER_SIZE {
            return None;
        }
        if region[..Guid::SIZE] != HASH_TABLE_GUID.as_bytes()[..] {
            return None;
        }

        let declared =
            u16::from_le_bytes([region[Guid::SIZE], region[Guid::SIZE + 1]]) as usize;
        let malformed = if declared < HEADER_SIZE || declared > region.len() {
            Some(ParseError::BadRootLength {
                declared,
                available: region.len(),
            })
        } else {
            None
        };
        let end = declared.clamp(HEADER_SIZE, region.len());

        Some(HashTable {
            entries: &region[HEADER_SIZE..end],
            malformed,
        })
    }

    /// Locate the table at the raw region named by static boot configuration.
    ///
    /// A null base or zero size returns `None`, as does a region without the
    /// root identifier.
    ///
    /// # Safety
    ///
    /// A non-zero `region` must describe `region.size` bytes of mapped guest
    /// memory that stay valid and unwritten for the rest of the boot stage.
    pub unsafe fn from_region(region: TableRegion) -> Option<HashTable<'static>> {
        if region.base == 0 || region.size == 0 {
            info!("no hash table region configured, artifact verification not requested");
            return None;
        }
        let bytes = unsafe {
            std::slice::from_raw_parts(region.base as usize as *const u8, region.size as usize)
        };
        let table = HashTable::parse(bytes);
        match &table {
            Some(t) => debug!(
                "found injected hash table at {:#x}, {} entry bytes",
                region.base,
                t.entries.len()
            ),
            None => info!(
                "no hash table at {:#x}, artifact verification not requested",
                region.base
            ),
        }
        table
    }

    /// Whether the table carries no entries at all.
    ///
    /// A present-but-empty table is valid; it is still fail-closed, since any
    /// lookup in it misses.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the payload of the entry tagged `guid`.
    ///
    /// `Ok(None)` means the table has no such entry. Structural faults in the
    /// walk are reported as errors, never as absence. The scan is bounded by
    /// the entry region and advances by at least one header per record.
    pub fn find(&self, guid: &Guid) -> Result<Option<&'a [u8]>, ParseError> {
        if let Some(err) = self.malformed {
            return Err(err);
        }

        let entries = self.entries;
        let mut offset = 0;
        while offset < entries.len() {
            let rest = &entries[offset..];
            if rest.len() < HEADER_SIZE {
                return Err(ParseError::TruncatedEntry {
                    offset,
                    remaining: rest.len(),
                });
            }
            let len = u16::from_le_bytes([rest[Guid::SIZE], rest[Guid::SIZE + 1]]) as usize;
            if len < HEADER_SIZE || len > rest.len() {
                return Err(ParseError::BadEntryLength { offset, len });
            }
            if rest[..Guid::SIZE] == guid.as_bytes()[..] {
                return Ok(Some(&rest[HEADER_SIZE..len]));
            }
            offset += len;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::{CMDLINE_HASH_GUID, INITRD_HASH_GUID, KERNEL_HASH_GUID};

    fn entry(guid: &Guid, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(guid.as_bytes());
        out.extend_from_slice(&((HEADER_SIZE + payload.len()) as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn table_bytes(entries: &[Vec<u8>]) -> Vec<u8> {
        let body = entries.concat();
        let mut out = Vec::new();
        out.extend_from_slice(HASH_TABLE_GUID.as_bytes());
        out.extend_from_slice(&((HEADER_SIZE + body.len()) as u16).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn parse_rejects_short_regions_and_foreign_identifiers() {
        assert!(HashTable::parse(&[]).is_none());
        assert!(HashTable::parse(&[0u8; 17]).is_none());

        let mut bytes = table_bytes(&[]);
        bytes[0] ^= 0xff;
        assert!(HashTable::parse(&bytes).is_none());
    }

    #[test]
    fn empty_table_is_present_and_scans_to_none() {
        let bytes = table_bytes(&[]);
        let table = HashTable::parse(&bytes).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.find(&KERNEL_HASH_GUID), Ok(None));
    }

    #[test]
    fn finds_entry_among_others() {
        let bytes = table_bytes(&[
            entry(&CMDLINE_HASH_GUID, &[0xaa; 32]),
            entry(&KERNEL_HASH_GUID, &[0xbb; 32]),
            entry(&INITRD_HASH_GUID, &[0xcc; 32]),
        ]);
        let table = HashTable::parse(&bytes).unwrap();

        let payload = table.find(&KERNEL_HASH_GUID).unwrap().unwrap();
        assert_eq!(payload, &[0xbb; 32]);
        assert_eq!(table.find(&HASH_TABLE_GUID), Ok(None));
    }

    #[test]
    fn odd_sized_payloads_are_scannable() {
        let bytes = table_bytes(&[
            entry(&CMDLINE_HASH_GUID, &[1, 2, 3]),
            entry(&KERNEL_HASH_GUID, &[]),
        ]);
        let table = HashTable::parse(&bytes).unwrap();

        assert_eq!(
            table.find(&CMDLINE_HASH_GUID).unwrap().unwrap(),
            &[1, 2, 3]
        );
        assert_eq!(table.find(&KERNEL_HASH_GUID).unwrap().unwrap(), &[] as &[u8]);
    }

    #[test]
    fn zero_length_entry_is_malformed_not_a_miss() {
        let mut bad = Vec::new();
        bad.extend_from_slice(KERNEL_HASH_GUID.as_bytes());
        bad.extend_from_slice(&0u16.to_le_bytes());
        let bytes = table_bytes(&[bad]);
        let table = HashTable::parse(&bytes).unwrap();

        assert_eq!(
            table.find(&INITRD_HASH_GUID),
            Err(ParseError::BadEntryLength { offset: 0, len: 0 })
        );
    }

    #[test]
    fn entry_overrunning_region_is_malformed() {
        let mut bad = Vec::new();
        bad.extend_from_slice(KERNEL_HASH_GUID.as_bytes());
        bad.extend_from_slice(&500u16.to_le_bytes());
        bad.extend_from_slice(&[0u8; 32]);
        let bytes = table_bytes(&[bad]);
        let table = HashTable::parse(&bytes).unwrap();

        assert_eq!(
            table.find(&KERNEL_HASH_GUID),
            Err(ParseError::BadEntryLength { offset: 0, len: 500 })
        );
    }

    #[test]
    fn trailing_partial_header_is_malformed() {
        let mut bytes = table_bytes(&[entry(&KERNEL_HASH_GUID, &[0u8; 32])]);
        // Five stray bytes accounted for by the root length.
        bytes.extend_from_slice(&[0u8; 5]);
        let declared = (bytes.len() as u16).to_le_bytes();
        bytes[16] = declared[0];
        bytes[17] = declared[1];
        let table = HashTable::parse(&bytes).unwrap();

        assert_eq!(
            table.find(&INITRD_HASH_GUID),
            Err(ParseError::TruncatedEntry {
                offset: 50,
                remaining: 5
            })
        );
    }

    #[test]
    fn root_overdeclaring_region_poisons_every_scan() {
        let mut bytes = table_bytes(&[entry(&KERNEL_HASH_GUID, &[0u8; 32])]);
        let available = bytes.len();
        bytes[16] = 0xff;
        bytes[17] = 0xff;
        let table = HashTable::parse(&bytes).unwrap();

        let expected = Err(ParseError::BadRootLength {
            declared: 0xffff,
            available,
        });
        assert_eq!(table.find(&KERNEL_HASH_GUID), expected);
        assert_eq!(table.find(&INITRD_HASH_GUID), expected);
    }

    #[test]
    fn root_shorter_than_header_is_malformed() {
        let mut bytes = table_bytes(&[]);
        bytes[16] = 17;
        bytes[17] = 0;
        let table = HashTable::parse(&bytes).unwrap();

        assert_eq!(
            table.find(&KERNEL_HASH_GUID),
            Err(ParseError::BadRootLength {
                declared: 17,
                available: HEADER_SIZE
            })
        );
    }

    #[test]
    fn null_or_empty_region_is_absence() {
        let table = unsafe { HashTable::from_region(TableRegion::default()) };
        assert!(table.is_none());

        let table = unsafe { HashTable::from_region(TableRegion { base: 0x1000, size: 0 }) };
        assert!(table.is_none());
    }

    #[test]
    fn from_region_reads_a_mapped_table() {
        let bytes = table_bytes(&[entry(&KERNEL_HASH_GUID, &[0x42; 32])]);
        let region = TableRegion {
            base: bytes.as_ptr() as u64,
            size: bytes.len() as u32,
        };
        let table = unsafe { HashTable::from_region(region) }.unwrap();
        assert_eq!(
            table.find(&KERNEL_HASH_GUID).unwrap().unwrap(),
            &[0x42; 32]
        );
    }

    #[test]
    fn table_region_deserializes_from_manifest_json() {
        let region: TableRegion =
            serde_json::from_str(r#"{"base": 16777216, "size": 1024}"#).unwrap();
        assert_eq!(
            region,
            TableRegion {
                base: 0x0100_0000,
                size: 1024
            }
        );
        assert_eq!(TableRegion::default(), TableRegion { base: 0, size: 0 });
    }
}
