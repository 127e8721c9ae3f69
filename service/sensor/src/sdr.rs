// Licensed under the Apache-2.0 license

//! Sensor Data Record repository.
//!
//! Only full sensor records (type 0x01) are kept. Record ids are the index
//! of the record in the repository and are assigned once at construction.

use log::{error, info};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes};

pub const SDR_VERSION: u8 = 0x51;
pub const SDR_TYPE_FULL_SENSOR: u8 = 0x01;
pub const SDR_HEADER_LEN: usize = 5;
/// Body length of a full sensor record without its id string.
pub const SDR_FULL_RECORD_LEN: u8 = 43;
pub const SDR_ID_STR_MAX: usize = 32;
/// 8-bit ASCII + Latin 1 type code in the upper bits of `id_len`.
pub const SDR_ID_TYPE_ASCII: u8 = 0xC0;

pub const SDR_END_ID: u16 = 0xFFFF;
pub const SDR_INVALID_ID: u16 = 0xFFFE;
pub const SDR_RSV_TABLE_COUNT: usize = 2;

const SDR_M_TOL_MASK: u8 = 0xC0;
const SDR_R_SHIFT: u8 = 4;

/// `10^-R` for the 4-bit two's complement result exponent, indexed by the raw
/// nibble. Positive exponents 0 to 6 are not scaled. Index 7 holds `10^9`, so
/// R = +7 scales by `10^9` and the rounding digit read at `r + 1` for R = +6
/// is always zero.
const NEGATIVE_TEN_POWER: [i64; 16] = [
    1,
    1,
    1,
    1,
    1,
    1,
    1,
    1_000_000_000,
    100_000_000,
    10_000_000,
    1_000_000,
    100_000,
    10_000,
    1_000,
    100,
    10,
];

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, PartialEq)]
#[repr(C, packed)]
pub struct SdrFullSensor {
    pub record_id: u16,
    pub sdr_version: u8,
    pub record_type: u8,
    pub record_len: u8,
    pub owner_id: u8,
    pub owner_lun: u8,
    pub sensor_num: u8,
    pub entity_id: u8,
    pub entity_instance: u8,
    pub sensor_init: u8,
    pub sensor_capabilities: u8,
    pub sensor_type: u8,
    pub event_reading_type: u8,
    pub assert_event_mask: u16,
    pub deassert_event_mask: u16,
    pub reading_mask: u16,
    pub sensor_units1: u8,
    pub sensor_units2: u8,
    pub sensor_units3: u8,
    pub linearization: u8,
    pub m: u8,
    pub m_tolerance: u8,
    pub b: u8,
    pub b_accuracy: u8,
    pub accuracy_exp: u8,
    pub r_b_exp: u8,
    pub analog_flags: u8,
    pub nominal_reading: u8,
    pub normal_max: u8,
    pub normal_min: u8,
    pub sensor_max: u8,
    pub sensor_min: u8,
    pub unr: u8,
    pub ucr: u8,
    pub unc: u8,
    pub lnr: u8,
    pub lcr: u8,
    pub lnc: u8,
    pub pos_hysteresis: u8,
    pub neg_hysteresis: u8,
    pub reserved: [u8; 2],
    pub oem: u8,
    pub id_len: u8,
    pub id_str: [u8; SDR_ID_STR_MAX],
}

impl Default for SdrFullSensor {
    fn default() -> Self {
        let mut sdr = SdrFullSensor::new_zeroed();
        sdr.sdr_version = SDR_VERSION;
        sdr.record_type = SDR_TYPE_FULL_SENSOR;
        sdr.record_len = SDR_FULL_RECORD_LEN;
        sdr.owner_lun = 0;
        sdr.m = 1;
        sdr.id_len = SDR_ID_TYPE_ASCII;
        sdr
    }
}

impl SdrFullSensor {
    pub fn new(sensor_num: u8, sensor_type: u8) -> Self {
        SdrFullSensor {
            sensor_num,
            sensor_type,
            ..Default::default()
        }
    }

    /// Sets the id string, truncated to 32 bytes. The length is folded into
    /// `id_len` and `record_len` when the record enters a repository.
    pub fn with_id_str(mut self, id: &str) -> Self {
        let len = id.len().min(SDR_ID_STR_MAX);
        self.id_str = [0; SDR_ID_STR_MAX];
        self.id_str[..len].copy_from_slice(&id.as_bytes()[..len]);
        self
    }

    pub fn with_mbr(mut self, m: u8, b: u8, r_b_exp: u8) -> Self {
        self.m = m;
        self.b = b;
        self.r_b_exp = r_b_exp;
        self
    }

    fn id_str_len(&self) -> u8 {
        self.id_str.iter().take_while(|&&c| c != 0).count() as u8
    }

    /// Header plus body as exposed by GetSdr.
    pub fn wire_len(&self) -> usize {
        SDR_HEADER_LEN + self.record_len as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Unr,
    Ucr,
    Unc,
    Lnr,
    Lcr,
    Lnc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbrFactor {
    M,
    B,
    R,
}

#[derive(Debug, Default)]
pub struct SdrRepository {
    records: Vec<SdrFullSensor>,
    rsv_ids: [u16; SDR_RSV_TABLE_COUNT],
}

impl SdrRepository {
    /// Builds the repository, assigning record ids in order. Records whose
    /// sensor number is already present are dropped.
    pub fn new(records: Vec<SdrFullSensor>) -> Self {
        let mut repo = SdrRepository::default();
        for mut record in records {
            if repo.find(record.sensor_num).is_some() {
                error!("Duplicate SDR for sensor {:#04x} dropped", record.sensor_num);
                continue;
            }
            let id_len = record.id_str_len();
            record.record_id = repo.records.len() as u16;
            record.id_len = SDR_ID_TYPE_ASCII | id_len;
            record.record_len = SDR_FULL_RECORD_LEN + id_len;
            repo.records.push(record);
        }
        info!("SDR repository initialised with {} records", repo.records.len());
        repo
    }

    pub fn is_initialized(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_record_id(&self) -> Option<u16> {
        self.records.len().checked_sub(1).map(|id| id as u16)
    }

    pub fn records(&self) -> &[SdrFullSensor] {
        &self.records
    }

    pub fn find(&self, sensor_num: u8) -> Option<&SdrFullSensor> {
        self.records.iter().find(|r| r.sensor_num == sensor_num)
    }

    fn find_mut(&mut self, sensor_num: u8) -> Option<&mut SdrFullSensor> {
        self.records.iter_mut().find(|r| r.sensor_num == sensor_num)
    }

    /// Id of the record following `current`.
    pub fn get_record_id(&self, current: u16) -> u16 {
        match self.last_record_id() {
            Some(last) if current < last => current + 1,
            Some(last) if current == last => SDR_END_ID,
            _ => SDR_INVALID_ID,
        }
    }

    pub fn check_record_id(&self, id: u16) -> bool {
        self.last_record_id().is_some_and(|last| id <= last)
    }

    /// Header and body of record `id` as sent in GetSdr.
    pub fn record_bytes(&self, id: u16) -> Option<&[u8]> {
        let record = self.records.get(id as usize)?;
        let len = record.wire_len().min(core::mem::size_of::<SdrFullSensor>());
        Some(&record.as_bytes()[..len])
    }

    /// Hands out a new reservation id for `table`. Ids start at 1.
    pub fn reserve(&mut self, table: usize) -> Option<u16> {
        let id = self.rsv_ids.get_mut(table)?;
        *id = id.wrapping_add(1);
        Some(*id)
    }

    pub fn check_reservation(&self, table: usize, id: u16) -> bool {
        self.rsv_ids.get(table).is_some_and(|&current| current == id)
    }

    pub fn change_threshold(&mut self, sensor_num: u8, threshold: Threshold, value: u8) -> bool {
        let Some(record) = self.find_mut(sensor_num) else {
            return false;
        };
        match threshold {
            Threshold::Unr => record.unr = value,
            Threshold::Ucr => record.ucr = value,
            Threshold::Unc => record.unc = value,
            Threshold::Lnr => record.lnr = value,
            Threshold::Lcr => record.lcr = value,
            Threshold::Lnc => record.lnc = value,
        }
        true
    }

    /// M and B are 10-bit values whose upper two bits share a byte with the
    /// tolerance and accuracy fields. R replaces the result exponent nibble.
    pub fn change_mbr(&mut self, sensor_num: u8, factor: MbrFactor, value: u16) -> bool {
        let Some(record) = self.find_mut(sensor_num) else {
            return false;
        };
        let high = ((value >> 8) << 6) as u8 & SDR_M_TOL_MASK;
        match factor {
            MbrFactor::M => {
                record.m = value as u8;
                record.m_tolerance = (record.m_tolerance & !SDR_M_TOL_MASK) | high;
            }
            MbrFactor::B => {
                record.b = value as u8;
                record.b_accuracy = (record.b_accuracy & !SDR_M_TOL_MASK) | high;
            }
            MbrFactor::R => {
                record.r_b_exp = (record.r_b_exp & 0x0F) | ((value as u8 & 0x0F) << SDR_R_SHIFT);
            }
        }
        true
    }

    /// Converts a reading into the raw one-byte IPMI form using the record's
    /// M and R factors, rounding on the next decimal digit.
    pub fn calculate_mbr(&self, sensor_num: u8, val: i64) -> Option<i64> {
        let record = self.find(sensor_num)?;
        let m = (((record.m_tolerance & SDR_M_TOL_MASK) as i64) << 2) | record.m as i64;
        let r = ((record.r_b_exp >> SDR_R_SHIFT) & 0x0F) as usize;
        let rexp = NEGATIVE_TEN_POWER[r];
        let round_add = if r > 0 && (NEGATIVE_TEN_POWER[(r + 1) & 0x0F] * val) % 10 > 5 {
            1
        } else {
            0
        };
        if m == 0 {
            Some(val * rexp + round_add)
        } else {
            Some(val * rexp / m + round_add)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn repo() -> SdrRepository {
        SdrRepository::new(vec![
            SdrFullSensor::new(0x01, 0x01).with_id_str("MB_INLET_TEMP"),
            SdrFullSensor::new(0x02, 0x02).with_id_str("MB_P12V"),
            SdrFullSensor::new(0x01, 0x01).with_id_str("DUPLICATE"),
            SdrFullSensor::new(0x03, 0x03),
        ])
    }

    #[test]
    fn test_record_ids_and_lengths() {
        let repo = repo();
        assert_eq!(repo.len(), 3);
        assert_eq!(core::mem::size_of::<SdrFullSensor>(), 48 + SDR_ID_STR_MAX);

        let first = &repo.records()[0];
        assert_eq!({ first.record_id }, 0);
        assert_eq!(first.id_len, SDR_ID_TYPE_ASCII | 13);
        assert_eq!(first.record_len, SDR_FULL_RECORD_LEN + 13);
        assert_eq!({ repo.records()[2].record_id }, 2);
        assert_eq!(repo.records()[2].record_len, SDR_FULL_RECORD_LEN);

        assert_eq!(repo.get_record_id(0), 1);
        assert_eq!(repo.get_record_id(2), SDR_END_ID);
        assert_eq!(repo.get_record_id(3), SDR_INVALID_ID);
        assert!(repo.check_record_id(2));
        assert!(!repo.check_record_id(3));
        assert!(!SdrRepository::new(vec![]).is_initialized());
    }

    #[test]
    fn test_record_bytes() {
        let repo = repo();
        let bytes = repo.record_bytes(1).unwrap();
        assert_eq!(bytes.len(), SDR_HEADER_LEN + SDR_FULL_RECORD_LEN as usize + 7);
        assert_eq!(&bytes[..5], &[0x01, 0x00, SDR_VERSION, SDR_TYPE_FULL_SENSOR, 50]);
        assert_eq!(bytes[7], 0x02);
        assert_eq!(&bytes[48..], b"MB_P12V");
        assert!(repo.record_bytes(9).is_none());
    }

    #[test]
    fn test_reservations() {
        let mut repo = repo();
        assert_eq!(repo.reserve(0), Some(1));
        assert_eq!(repo.reserve(0), Some(2));
        assert_eq!(repo.reserve(1), Some(1));
        assert!(repo.check_reservation(0, 2));
        assert!(!repo.check_reservation(0, 1));
        assert!(repo.check_reservation(1, 1));
        assert_eq!(repo.reserve(2), None);
    }

    #[test]
    fn test_thresholds_and_mbr() {
        let mut repo = repo();
        assert!(repo.change_threshold(0x02, Threshold::Ucr, 0x80));
        assert_eq!(repo.find(0x02).unwrap().ucr, 0x80);
        assert!(!repo.change_threshold(0x09, Threshold::Lcr, 1));

        // 12 V with M = 1 and R = -2 is sent as 1200.
        assert!(repo.change_mbr(0x02, MbrFactor::R, 0x0E));
        assert_eq!(repo.calculate_mbr(0x02, 12), Some(1200));

        assert!(repo.change_mbr(0x02, MbrFactor::M, 0x105));
        let record = repo.find(0x02).unwrap();
        assert_eq!(record.m, 0x05);
        assert_eq!(record.m_tolerance, 0x40);
        // M = 0x105 = 261
        assert_eq!(repo.calculate_mbr(0x02, 522), Some(200));

        assert!(repo.change_mbr(0x03, MbrFactor::M, 0));
        assert_eq!(repo.calculate_mbr(0x03, 42), Some(42));
        assert_eq!(repo.calculate_mbr(0x7F, 42), None);
    }

    #[test]
    fn test_mbr_positive_exponents() {
        let mut repo = repo();
        assert!(repo.change_mbr(0x02, MbrFactor::R, 0x06));
        assert_eq!(repo.calculate_mbr(0x02, 17), Some(17));

        assert!(repo.change_mbr(0x02, MbrFactor::R, 0x07));
        assert_eq!(repo.calculate_mbr(0x02, 2), Some(2_000_000_000));

        // R = -1 scales by ten.
        assert!(repo.change_mbr(0x02, MbrFactor::R, 0x0F));
        assert_eq!(repo.calculate_mbr(0x02, 3), Some(30));
    }
}
