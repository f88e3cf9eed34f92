use std::{fmt, str::FromStr};

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Sufijos binarios, de mayor a menor (se usan también para el formato canónico).
const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ei", 60),
    ("Pi", 50),
    ("Ti", 40),
    ("Gi", 30),
    ("Mi", 20),
    ("Ki", 10),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("tamaño vacío")]
    Empty,

    #[error("el tamaño no puede ser negativo")]
    Negative,

    #[error("el tamaño debe ser mayor que cero")]
    Zero,

    #[error("magnitud numérica inválida: {0:?}")]
    InvalidNumber(String),

    #[error("sufijo de unidad desconocido: {0:?}")]
    UnknownSuffix(String),

    #[error("el tamaño no cabe en 64 bits")]
    Overflow,
}

/// Cantidad exacta de almacenamiento, en bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageSize {
    bytes: u64,
}

impl StorageSize {
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Parsea un tamaño tipo "10Gi", "500M", "1.5Gi" o "1e9".
    /// Los valores fraccionarios de bytes se redondean hacia arriba.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }
        if s.starts_with('-') {
            return Err(QuantityError::Negative);
        }
        let s = s.strip_prefix('+').unwrap_or(s);

        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);

        let (mantissa, scale) = parse_mantissa(number)?;
        let (num, den) = parse_suffix(suffix)?;

        let numerator = mantissa.checked_mul(num).ok_or(QuantityError::Overflow)?;
        let denominator = scale.checked_mul(den).ok_or(QuantityError::Overflow)?;

        // ceil(numerator / denominator)
        let mut bytes = numerator / denominator;
        if numerator % denominator != 0 {
            bytes += 1;
        }

        if bytes == 0 {
            return Err(QuantityError::Zero);
        }
        let bytes = u64::try_from(bytes).map_err(|_| QuantityError::Overflow)?;

        Ok(Self { bytes })
    }

    /// Cantidad lista para usarse como `requests.storage`.
    pub fn to_quantity(&self) -> Quantity {
        Quantity(self.to_string())
    }
}

/// Devuelve (mantisa entera, escala) tal que valor = mantisa / escala.
fn parse_mantissa(number: &str) -> Result<(u128, u128), QuantityError> {
    let invalid = || QuantityError::InvalidNumber(number.to_string());

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if frac_part.contains('.') {
        return Err(invalid());
    }

    let mut mantissa: u128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        let digit = c.to_digit(10).ok_or_else(invalid)? as u128;
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(digit))
            .ok_or(QuantityError::Overflow)?;
    }

    let scale = pow10(frac_part.len() as u32)?;
    Ok((mantissa, scale))
}

/// Devuelve (numerador, denominador) del multiplicador del sufijo.
fn parse_suffix(suffix: &str) -> Result<(u128, u128), QuantityError> {
    if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(name, _)| *name == suffix) {
        return Ok((1u128 << shift, 1));
    }

    let decimal = match suffix {
        "" => Some((1, 1)),
        "m" => Some((1, 1_000)),
        "k" => Some((pow10(3)?, 1)),
        "M" => Some((pow10(6)?, 1)),
        "G" => Some((pow10(9)?, 1)),
        "T" => Some((pow10(12)?, 1)),
        "P" => Some((pow10(15)?, 1)),
        "E" => Some((pow10(18)?, 1)),
        _ => None,
    };
    if let Some(mult) = decimal {
        return Ok(mult);
    }

    // exponente decimal: e3, E-2, e+6
    if let Some(exp) = suffix.strip_prefix('e').or_else(|| suffix.strip_prefix('E')) {
        let unknown = || QuantityError::UnknownSuffix(suffix.to_string());
        let (negative, digits) = match exp.as_bytes().first() {
            Some(b'-') => (true, &exp[1..]),
            Some(b'+') => (false, &exp[1..]),
            _ => (false, exp),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(unknown());
        }
        let value: u32 = digits.parse().map_err(|_| QuantityError::Overflow)?;
        let factor = pow10(value)?;
        return Ok(if negative { (1, factor) } else { (factor, 1) });
    }

    Err(QuantityError::UnknownSuffix(suffix.to_string()))
}

fn pow10(exp: u32) -> Result<u128, QuantityError> {
    10u128.checked_pow(exp).ok_or(QuantityError::Overflow)
}

impl fmt::Display for StorageSize {
    /// Formato canónico: mayor sufijo binario exacto o bytes sin sufijo.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (suffix, shift) in BINARY_SUFFIXES {
            let unit = 1u64 << shift;
            if self.bytes >= unit && self.bytes % unit == 0 {
                return write!(f, "{}{}", self.bytes >> shift, suffix);
            }
        }
        write!(f, "{}", self.bytes)
    }
}

impl FromStr for StorageSize {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
