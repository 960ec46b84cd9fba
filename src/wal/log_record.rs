use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, PageId, Rid, TxnId, INVALID_LSN};

/// Fixed header preceding every log record:
/// total size (4) | LSN (4) | txn id (4) | prev LSN (4) | record type (4).
pub const HEADER_SIZE: usize = 20;

/// Types of log records written to the WAL stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    Invalid = 0,
    Insert = 1,
    MarkDelete = 2,
    ApplyDelete = 3,
    RollbackDelete = 4,
    Update = 5,
    Begin = 6,
    Commit = 7,
    Abort = 8,
    NewPage = 9,
}

impl LogRecordType {
    fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Insert),
            2 => Some(Self::MarkDelete),
            3 => Some(Self::ApplyDelete),
            4 => Some(Self::RollbackDelete),
            5 => Some(Self::Update),
            6 => Some(Self::Begin),
            7 => Some(Self::Commit),
            8 => Some(Self::Abort),
            9 => Some(Self::NewPage),
            _ => None,
        }
    }
}

/// Type-dependent record body. Tuples are serialized with a 4-byte length
/// prefix; RIDs take 8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPayload {
    /// BEGIN / COMMIT / ABORT carry no body.
    Transaction,
    Insert { rid: Rid, tuple: Vec<u8> },
    /// Shared by MARKDELETE, APPLYDELETE and ROLLBACKDELETE; the record type
    /// distinguishes them.
    Delete { rid: Rid, tuple: Vec<u8> },
    Update { rid: Rid, old_tuple: Vec<u8>, new_tuple: Vec<u8> },
    NewPage { prev_page_id: PageId, page_id: PageId },
}

/// One write-ahead log record. The LSN is unassigned until the record goes
/// through `LogManager::append_log_record`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub size: i32,
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub record_type: LogRecordType,
    pub payload: LogPayload,
}

impl LogRecord {
    fn new(txn_id: TxnId, prev_lsn: Lsn, record_type: LogRecordType, payload: LogPayload) -> Self {
        let body_size = match &payload {
            LogPayload::Transaction => 0,
            LogPayload::Insert { tuple, .. } | LogPayload::Delete { tuple, .. } => {
                Rid::SIZE + 4 + tuple.len()
            }
            LogPayload::Update { old_tuple, new_tuple, .. } => {
                Rid::SIZE + 4 + old_tuple.len() + 4 + new_tuple.len()
            }
            LogPayload::NewPage { .. } => 8,
        };

        Self {
            size: (HEADER_SIZE + body_size) as i32,
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            record_type,
            payload,
        }
    }

    pub fn new_begin(txn_id: TxnId) -> Self {
        Self::new(txn_id, INVALID_LSN, LogRecordType::Begin, LogPayload::Transaction)
    }

    pub fn new_commit(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogRecordType::Commit, LogPayload::Transaction)
    }

    pub fn new_abort(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogRecordType::Abort, LogPayload::Transaction)
    }

    pub fn new_insert(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Vec<u8>) -> Self {
        Self::new(txn_id, prev_lsn, LogRecordType::Insert, LogPayload::Insert { rid, tuple })
    }

    /// `record_type` must be one of the three delete variants.
    pub fn new_delete(
        txn_id: TxnId,
        prev_lsn: Lsn,
        record_type: LogRecordType,
        rid: Rid,
        tuple: Vec<u8>,
    ) -> Self {
        debug_assert!(matches!(
            record_type,
            LogRecordType::MarkDelete | LogRecordType::ApplyDelete | LogRecordType::RollbackDelete
        ));
        Self::new(txn_id, prev_lsn, record_type, LogPayload::Delete { rid, tuple })
    }

    pub fn new_update(
        txn_id: TxnId,
        prev_lsn: Lsn,
        rid: Rid,
        old_tuple: Vec<u8>,
        new_tuple: Vec<u8>,
    ) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogRecordType::Update,
            LogPayload::Update { rid, old_tuple, new_tuple },
        )
    }

    pub fn new_page(txn_id: TxnId, prev_lsn: Lsn, prev_page_id: PageId, page_id: PageId) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogRecordType::NewPage,
            LogPayload::NewPage { prev_page_id, page_id },
        )
    }

    /// Serialize the record into `buf`, which must be exactly `size` bytes.
    pub fn serialize_into(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), self.size as usize);

        LittleEndian::write_i32(&mut buf[0..4], self.size);
        LittleEndian::write_i32(&mut buf[4..8], self.lsn);
        LittleEndian::write_i32(&mut buf[8..12], self.txn_id);
        LittleEndian::write_i32(&mut buf[12..16], self.prev_lsn);
        LittleEndian::write_i32(&mut buf[16..20], self.record_type as i32);

        let mut pos = HEADER_SIZE;
        match &self.payload {
            LogPayload::Transaction => {}
            LogPayload::Insert { rid, tuple } | LogPayload::Delete { rid, tuple } => {
                rid.write_to(&mut buf[pos..pos + Rid::SIZE]);
                pos += Rid::SIZE;
                write_tuple(buf, &mut pos, tuple);
            }
            LogPayload::Update { rid, old_tuple, new_tuple } => {
                rid.write_to(&mut buf[pos..pos + Rid::SIZE]);
                pos += Rid::SIZE;
                write_tuple(buf, &mut pos, old_tuple);
                write_tuple(buf, &mut pos, new_tuple);
            }
            LogPayload::NewPage { prev_page_id, page_id } => {
                LittleEndian::write_i32(&mut buf[pos..pos + 4], *prev_page_id);
                LittleEndian::write_i32(&mut buf[pos + 4..pos + 8], *page_id);
            }
        }
    }

    /// Deserialize one record from the front of `buf`. Returns `None` for a
    /// record that is truncated, malformed, or absent; callers treat that as
    /// the end of the current batch.
    pub fn deserialize(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }

        let size = LittleEndian::read_i32(&buf[0..4]);
        if size < HEADER_SIZE as i32 || size as usize > buf.len() {
            return None;
        }

        let lsn = LittleEndian::read_i32(&buf[4..8]);
        let txn_id = LittleEndian::read_i32(&buf[8..12]);
        let prev_lsn = LittleEndian::read_i32(&buf[12..16]);
        let record_type = LogRecordType::from_i32(LittleEndian::read_i32(&buf[16..20]))?;

        let body = &buf[HEADER_SIZE..size as usize];
        let payload = match record_type {
            LogRecordType::Begin | LogRecordType::Commit | LogRecordType::Abort => {
                LogPayload::Transaction
            }
            LogRecordType::Insert => {
                let (rid, tuple) = read_rid_and_tuple(body)?;
                LogPayload::Insert { rid, tuple }
            }
            LogRecordType::MarkDelete | LogRecordType::ApplyDelete | LogRecordType::RollbackDelete => {
                let (rid, tuple) = read_rid_and_tuple(body)?;
                LogPayload::Delete { rid, tuple }
            }
            LogRecordType::Update => {
                if body.len() < Rid::SIZE {
                    return None;
                }
                let rid = Rid::read_from(&body[..Rid::SIZE]);
                let mut pos = Rid::SIZE;
                let old_tuple = read_tuple(body, &mut pos)?;
                let new_tuple = read_tuple(body, &mut pos)?;
                LogPayload::Update { rid, old_tuple, new_tuple }
            }
            LogRecordType::NewPage => {
                if body.len() < 8 {
                    return None;
                }
                LogPayload::NewPage {
                    prev_page_id: LittleEndian::read_i32(&body[0..4]),
                    page_id: LittleEndian::read_i32(&body[4..8]),
                }
            }
            LogRecordType::Invalid => return None,
        };

        Some(Self {
            size,
            lsn,
            txn_id,
            prev_lsn,
            record_type,
            payload,
        })
    }
}

fn write_tuple(buf: &mut [u8], pos: &mut usize, tuple: &[u8]) {
    LittleEndian::write_u32(&mut buf[*pos..*pos + 4], tuple.len() as u32);
    *pos += 4;
    buf[*pos..*pos + tuple.len()].copy_from_slice(tuple);
    *pos += tuple.len();
}

fn read_tuple(body: &[u8], pos: &mut usize) -> Option<Vec<u8>> {
    if body.len() < *pos + 4 {
        return None;
    }
    let len = LittleEndian::read_u32(&body[*pos..*pos + 4]) as usize;
    *pos += 4;
    if body.len() < *pos + len {
        return None;
    }
    let tuple = body[*pos..*pos + len].to_vec();
    *pos += len;
    Some(tuple)
}

fn read_rid_and_tuple(body: &[u8]) -> Option<(Rid, Vec<u8>)> {
    if body.len() < Rid::SIZE {
        return None;
    }
    let rid = Rid::read_from(&body[..Rid::SIZE]);
    let mut pos = Rid::SIZE;
    let tuple = read_tuple(body, &mut pos)?;
    Some((rid, tuple))
}
