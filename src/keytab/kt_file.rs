#![allow(unused_assignments)]
use crate::error::KrbError;
use crate::keytab::{Keytab, KeytabEntry};
use crate::proto::{PrincipalName, ServiceKey};
use binrw::helpers::until_eof;
use binrw::io::{SeekFrom, TakeSeekExt};
use binrw::BinReaderExt;
use binrw::{binread, binwrite, BinWrite};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read};
use tracing::{debug, error};

#[binwrite]
#[brw(big)]
#[binread]
#[derive(Debug, Clone, PartialEq, Eq)]
struct Data {
    #[br(temp)]
    #[bw(try_calc(u16::try_from(value.len())))]
    value_len: u16,
    #[br(count = value_len)]
    value: Vec<u8>,
}

impl Data {
    fn from_text(s: &str) -> Self {
        Data {
            value: s.as_bytes().to_vec(),
        }
    }

    fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value).to_string()
    }
}

#[binwrite]
#[brw(big)]
#[derive(Clone, PartialEq, Eq)]
#[binread]
#[br(import { version: u8 })]
struct Principal {
    #[br(temp)]
    #[bw(try_calc(u16::try_from(components.len())))]
    components_count: u16,
    realm: Data,
    // components includes the realm in version 1
    #[br(count = if version == 1 { components_count.saturating_sub(1) } else { components_count })]
    components: Vec<Data>,
    #[br(if(version > 1))]
    name_type: Option<u32>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c: Vec<_> = self.components.iter().map(Data::to_string_lossy).collect();
        f.debug_struct("Principal")
            .field("components", &c)
            .field("realm", &self.realm.to_string_lossy())
            .field("name_type", &self.name_type)
            .finish()
    }
}

impl From<(&PrincipalName, &str)> for Principal {
    fn from((name, realm): (&PrincipalName, &str)) -> Self {
        Principal {
            realm: Data::from_text(realm),
            components: name.components().iter().map(|c| Data::from_text(c)).collect(),
            name_type: Some(name.name_type() as u32),
        }
    }
}

impl TryFrom<&Principal> for (PrincipalName, String) {
    type Error = KrbError;

    fn try_from(value: &Principal) -> Result<Self, Self::Error> {
        let components = value
            .components
            .iter()
            .map(Data::to_string_lossy)
            .collect();
        // Version 1 keytabs carry no name type.
        let name_type = value.name_type.unwrap_or(0) as i32;

        let name = PrincipalName::from_parts(name_type, components)?;
        Ok((name, value.realm.to_string_lossy()))
    }
}

#[binwrite]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
#[binread]
#[br(import { version: u8, rlen: i32 })]
enum RecordData {
    #[br(pre_assert(rlen > 0))]
    Entry {
        #[br(args { version })]
        principal: Principal,
        timestamp: u32,
        key_version_u8: u8,
        enctype: u16,
        key: Data,
        // Only if 4 bytes remaining in the stream (field present from version 1.14)
        #[br(try)]
        key_version_u32: Option<u32>,
    },
    // A negative record length represents a "hole" in the file, it is, an entry that has
    // been invalidated. The length of the hole is the inverse of the record length.
    #[br(pre_assert(rlen <= 0))]
    Hole {
        #[br(count = rlen.unsigned_abs())]
        pad: Vec<u8>,
    },
}

impl From<&KeytabEntry> for RecordData {
    fn from(value: &KeytabEntry) -> Self {
        let kvno = value.key.kvno();
        let etype: i32 = value.key.etype().into();

        RecordData::Entry {
            principal: (&value.principal, value.realm.as_str()).into(),
            timestamp: value.timestamp,
            // Wraps, readers prefer the 32 bit kvno when present.
            key_version_u8: kvno as u8,
            enctype: etype as u16,
            key: Data {
                value: value.key.k().to_vec(),
            },
            key_version_u32: Some(kvno),
        }
    }
}

impl TryFrom<&RecordData> for Option<KeytabEntry> {
    type Error = KrbError;

    fn try_from(value: &RecordData) -> Result<Self, Self::Error> {
        match value {
            RecordData::Hole { pad: _ } => Ok(None),
            RecordData::Entry {
                principal,
                timestamp,
                key_version_u8,
                enctype,
                key,
                key_version_u32,
            } => {
                let kvno = match key_version_u32 {
                    Some(v) => *v,
                    None => u32::from(*key_version_u8),
                };

                let (principal, realm): (PrincipalName, String) = principal.try_into()?;

                // Keys of types we can't use stay in the file but are not
                // offered to the acceptor.
                let key = match ServiceKey::from_raw(i32::from(*enctype), &key.value, kvno) {
                    Ok(key) => key,
                    Err(KrbError::UnsupportedEncryption) => {
                        debug!(%principal, enctype, kvno, "skipping key of unsupported type");
                        return Ok(None);
                    }
                    Err(err) => return Err(err),
                };

                Ok(Some(KeytabEntry {
                    principal,
                    realm,
                    key,
                    timestamp: *timestamp,
                }))
            }
        }
    }
}

// Custom writer to seek back to fill the record length
#[binrw::writer(writer, endian)]
fn write_rdata(rdata: &RecordData) -> binrw::BinResult<()> {
    let start = writer.stream_position()?;
    rdata.write_options(writer, endian, ())?;
    let end = writer.stream_position()?;
    let rlen: i32 = end as i32 - start as i32;

    writer.seek(SeekFrom::Start(start - 4))?;
    rlen.write_options(writer, endian, ())?;
    writer.seek(SeekFrom::Start(end))?;
    Ok(())
}

#[binwrite]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
#[binread]
#[br(import { version: u8 })]
struct Record {
    #[br(temp)]
    #[bw(if (matches!(rdata, RecordData::Entry { .. })), calc = 0)]
    // This field is always written as 0, the custom rdata writer will seek back to fill it
    rlen: i32,
    #[br(map_stream = |s| s.take_seek(rlen.unsigned_abs() as u64), args { version, rlen })]
    #[bw(if (matches!(rdata, RecordData::Entry { .. })), write_with = write_rdata)]
    rdata: RecordData,
}

#[binread]
#[binwrite]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileKeytabV2 {
    #[br(parse_with = until_eof, args { version: 2 })]
    records: Vec<Record>,
}

#[binread]
#[binwrite]
#[brw(big, magic = 5u8)]
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileKeytab {
    #[brw(magic = 2u8)]
    V2(FileKeytabV2),
}

impl From<&Keytab> for FileKeytab {
    fn from(value: &Keytab) -> Self {
        let records: Vec<Record> = value
            .iter()
            .map(|x| Record { rdata: x.into() })
            .collect();
        FileKeytab::V2(FileKeytabV2 { records })
    }
}

impl TryFrom<&FileKeytab> for Keytab {
    type Error = KrbError;

    fn try_from(value: &FileKeytab) -> Result<Self, Self::Error> {
        match value {
            FileKeytab::V2(v2) => {
                let mut entries: Vec<KeytabEntry> = Vec::with_capacity(v2.records.len());
                for record in &v2.records {
                    let entry: Option<KeytabEntry> = (&record.rdata).try_into()?;
                    if let Some(e) = entry {
                        entries.push(e);
                    }
                }
                Ok(entries)
            }
        }
    }
}

fn read(buffer: &[u8]) -> Result<FileKeytab, KrbError> {
    let mut reader = binrw::io::Cursor::new(buffer);
    let keytab: FileKeytab = reader.read_type(binrw::Endian::Big).map_err(|err| {
        error!(?err, "Failed to unmarshall keytab buffer");
        KrbError::BinRWError
    })?;
    Ok(keytab)
}

pub(super) fn store(path: &str, kt: &Keytab) -> Result<(), KrbError> {
    let f = File::create(path).map_err(|io_err| {
        error!(?io_err, "Unable to create file at {}", path);
        KrbError::IoError
    })?;

    let mut writer = BufWriter::new(f);
    let kt: FileKeytab = kt.into();
    kt.write(&mut writer).map_err(|binrw_err| {
        error!(?binrw_err, "Unable to write binary data.");
        KrbError::BinRWError
    })?;

    writer.into_inner().map_err(|io_err| {
        error!(?io_err, "Unable to flush file at {}", path);
        KrbError::IoError
    })?;

    Ok(())
}

pub(super) fn load(path: &str) -> Result<Keytab, KrbError> {
    let mut f = File::open(path).map_err(|io_err| {
        error!(?io_err, "Unable to open file at {}", path);
        KrbError::IoError
    })?;

    let mut buffer = Vec::new();
    f.read_to_end(&mut buffer).map_err(|io_err| {
        error!(?io_err, "Unable to read file at {}", path);
        KrbError::IoError
    })?;

    let fk: FileKeytab = read(&buffer)?;
    (&fk).try_into()
}
