// src/utils/id_generator.rs
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    Ride,
    Driver,
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Ride => "rid",
            IdType::Driver => "drv",
        }
    }

    fn from_prefix(prefix: &str) -> Option<IdType> {
        match prefix {
            "rid" => Some(IdType::Ride),
            "drv" => Some(IdType::Driver),
            _ => None,
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefix())
    }
}

pub struct IdGenerator;

impl IdGenerator {
    /// `{prefix}-{YYMMDD}-{suffix}`, suffix being 5 characters that mix hex and alphanumerics.
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let date_part = timestamp.format("%y%m%d").to_string();
        format!("{}-{}-{}", id_type.to_prefix(), date_part, Self::random_suffix())
    }

    fn random_suffix() -> String {
        const HEX: &[u8] = b"0123456789abcdef";
        const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

        if rand::random::<bool>() {
            format!("{}{}", Self::pick(HEX, 3), Self::pick(ALNUM, 2))
        } else {
            format!("{}{}", Self::pick(ALNUM, 3), Self::pick(HEX, 2))
        }
    }

    fn pick(charset: &[u8], n: usize) -> String {
        let mut rng = rand::rng();
        (0..n)
            .map(|_| charset[rng.random_range(0..charset.len())] as char)
            .collect()
    }

    pub fn parse_id(id: &str) -> Option<ParsedId> {
        let mut parts = id.splitn(3, '-');
        let id_type = IdType::from_prefix(parts.next()?)?;
        let date_part = parts.next()?;
        let suffix = parts.next()?;

        if date_part.len() != 6 || suffix.len() != 5 || !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        let year = 2000 + date_part.get(0..2)?.parse::<i32>().ok()?;
        let month = date_part.get(2..4)?.parse::<u32>().ok()?;
        let day = date_part.get(4..6)?.parse::<u32>().ok()?;
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()?;

        Some(ParsedId { id_type, year, month, day, random_suffix: suffix.to_string() })
    }

    pub fn validate_id(id: &str, expected_type: Option<IdType>) -> bool {
        match Self::parse_id(id) {
            Some(parsed) => expected_type.is_none_or(|expected| parsed.id_type == expected),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedId {
    pub id_type: IdType,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub random_suffix: String,
}

impl ParsedId {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, 0, 0, 0).single()
    }
}

pub fn generate_ride_id() -> String {
    IdGenerator::generate(IdType::Ride)
}
