//! Deterministic encoding of records into leaves.
//!
//! A record is a tuple of [values](Value), described by a [`LeafSchema`] of
//! [Solidity types](AbiType). Its encoding is Solidity's `abi.encode` of that
//! tuple. Only static types are supported, so every value occupies exactly one
//! 32-byte word and the encoding of a well-typed record is injective:
//!
//! | type       | word layout                                           |
//! |:-----------|:------------------------------------------------------|
//! | `uint<M>`  | big-endian, left-padded with `0x00`                   |
//! | `int<M>`   | big-endian two's complement, sign-extended            |
//! | `address`  | the 20 address bytes, left-padded with `0x00`         |
//! | `bool`     | `0` or `1`, left-padded with `0x00`                   |
//! | `bytes<N>` | the `N` bytes, right-padded with `0x00`               |

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use num_bigint::BigInt;
use num_bigint::BigUint;
use num_bigint::Sign;
use num_traits::Signed;
use serde::Deserialize;
use serde::Serialize;

use crate::digest::Digest;
use crate::error::EncodingError;
use crate::keccak;

/// The number of bytes every value occupies in an encoded record.
pub const WORD_BYTES: usize = 32;

/// The number of bytes of an `address`.
pub const ADDRESS_BYTES: usize = 20;

/// A record: the ordered values that make up one leaf.
pub type Record = Vec<Value>;

/// A static Solidity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AbiType {
    /// `uint<M>`, where `M` is the bit width.
    Uint(u16),

    /// `int<M>`, where `M` is the bit width.
    Int(u16),

    Address,
    Bool,

    /// `bytes<N>`, where `N` is the number of bytes.
    FixedBytes(u8),
}

/// One typed value of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Uint(BigUint),
    Int(BigInt),
    Address([u8; ADDRESS_BYTES]),
    Bool(bool),
    FixedBytes(Vec<u8>),
}

impl AbiType {
    pub const UINT256: Self = Self::Uint(256);
    pub const INT256: Self = Self::Int(256);

    const fn is_valid_bit_width(bits: u16) -> bool {
        bits != 0 && bits <= 256 && bits % 8 == 0
    }

    const fn is_valid_byte_width(bytes: u8) -> bool {
        bytes != 0 && bytes as usize <= WORD_BYTES
    }

    /// Whether the width of this type is one Solidity accepts. Variants can be
    /// constructed with any width; parsing only ever yields valid ones.
    pub const fn is_valid(self) -> bool {
        match self {
            Self::Uint(bits) | Self::Int(bits) => Self::is_valid_bit_width(bits),
            Self::FixedBytes(bytes) => Self::is_valid_byte_width(bytes),
            Self::Address | Self::Bool => true,
        }
    }

    /// Parse a value of this type from its textual representation.
    ///
    /// Integers are decimal or `0x`-prefixed hex, `int`s may carry a leading
    /// `-`. Addresses and fixed-size byte strings are `0x`-prefixed hex;
    /// address checksums are not validated. Booleans are `true` or `false`.
    ///
    /// Only the syntax is checked here. Whether the value fits the type's
    /// width is checked when the record is [encoded](LeafSchema::encode).
    pub fn parse_value(self, input: &str) -> Result<Value, EncodingError> {
        let invalid = || EncodingError::InvalidValue {
            input: input.to_string(),
            expected: self,
        };

        let value = match self {
            Self::Uint(_) => Value::Uint(parse_biguint(input).ok_or_else(invalid)?),
            Self::Int(_) => {
                let (sign, magnitude) = match input.strip_prefix('-') {
                    Some(magnitude) => (Sign::Minus, magnitude),
                    None => (Sign::Plus, input),
                };
                let magnitude = parse_biguint(magnitude).ok_or_else(invalid)?;
                Value::Int(BigInt::from_biguint(sign, magnitude))
            }
            Self::Address => {
                let bytes = decode_prefixed_hex(input).ok_or_else(invalid)?;
                Value::Address(bytes.try_into().map_err(|_| invalid())?)
            }
            Self::Bool => match input {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            Self::FixedBytes(_) => Value::FixedBytes(decode_prefixed_hex(input).ok_or_else(invalid)?),
        };

        Ok(value)
    }

    /// Encode `value`, found at `position` of its record, into one word.
    fn encode_word(self, position: usize, value: &Value) -> Result<[u8; WORD_BYTES], EncodingError> {
        if !self.is_valid() {
            return Err(EncodingError::UnknownType(self.to_string()));
        }

        let mut word = [0; WORD_BYTES];
        match (self, value) {
            (Self::Uint(bits), Value::Uint(uint)) => {
                if uint.bits() > u64::from(bits) {
                    return Err(EncodingError::IntegerOverflow {
                        position,
                        expected: self,
                    });
                }
                let bytes = uint.to_bytes_be();
                word[WORD_BYTES - bytes.len()..].copy_from_slice(&bytes);
            }
            (Self::Int(bits), Value::Int(int)) => {
                // `int<M>` holds -2^(M-1) ..= 2^(M-1) - 1
                let magnitude = if int.is_negative() {
                    -int - 1_u8
                } else {
                    int.clone()
                };
                if magnitude.bits() >= u64::from(bits) {
                    return Err(EncodingError::IntegerOverflow {
                        position,
                        expected: self,
                    });
                }
                if int.is_negative() {
                    word = [0xff; WORD_BYTES];
                }
                let bytes = int.to_signed_bytes_be();
                word[WORD_BYTES - bytes.len()..].copy_from_slice(&bytes);
            }
            (Self::Address, Value::Address(address)) => {
                word[WORD_BYTES - ADDRESS_BYTES..].copy_from_slice(address);
            }
            (Self::Bool, Value::Bool(boolean)) => word[WORD_BYTES - 1] = u8::from(*boolean),
            (Self::FixedBytes(len), Value::FixedBytes(bytes)) => {
                let needed = usize::from(len);
                if bytes.len() != needed {
                    return Err(EncodingError::InvalidByteLength {
                        position,
                        expected: self,
                        needed,
                        actual: bytes.len(),
                    });
                }
                word[..needed].copy_from_slice(bytes);
            }
            _ => {
                return Err(EncodingError::TypeMismatch {
                    position,
                    expected: self,
                });
            }
        }

        Ok(word)
    }
}

fn parse_biguint(input: &str) -> Option<BigUint> {
    match input.strip_prefix("0x") {
        Some(hex_digits) => BigUint::parse_bytes(hex_digits.as_bytes(), 16),
        None => BigUint::parse_bytes(input.as_bytes(), 10),
    }
}

fn decode_prefixed_hex(input: &str) -> Option<Vec<u8>> {
    hex::decode(input.strip_prefix("0x")?).ok()
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::Address => write!(f, "address"),
            Self::Bool => write!(f, "bool"),
            Self::FixedBytes(bytes) => write!(f, "bytes{bytes}"),
        }
    }
}

impl FromStr for AbiType {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || EncodingError::UnknownType(s.to_string());

        let abi_type = match s {
            "address" => Self::Address,
            "bool" => Self::Bool,
            "uint" => Self::UINT256,
            "int" => Self::INT256,
            _ => {
                if let Some(bits) = s.strip_prefix("uint") {
                    let bits = bits.parse().map_err(|_| unknown())?;
                    Self::Uint(bits)
                } else if let Some(bits) = s.strip_prefix("int") {
                    let bits = bits.parse().map_err(|_| unknown())?;
                    Self::Int(bits)
                } else if let Some(bytes) = s.strip_prefix("bytes") {
                    // dynamic `bytes` has no width and is rejected here
                    let bytes = bytes.parse().map_err(|_| unknown())?;
                    Self::FixedBytes(bytes)
                } else {
                    return Err(unknown());
                }
            }
        };

        if !abi_type.is_valid() {
            return Err(unknown());
        }

        Ok(abi_type)
    }
}

impl TryFrom<String> for AbiType {
    type Error = EncodingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AbiType> for String {
    fn from(abi_type: AbiType) -> Self {
        abi_type.to_string()
    }
}

impl From<u64> for Value {
    fn from(uint: u64) -> Self {
        Self::Uint(uint.into())
    }
}

impl From<u128> for Value {
    fn from(uint: u128) -> Self {
        Self::Uint(uint.into())
    }
}

impl From<BigUint> for Value {
    fn from(uint: BigUint) -> Self {
        Self::Uint(uint)
    }
}

impl From<i64> for Value {
    fn from(int: i64) -> Self {
        Self::Int(int.into())
    }
}

impl From<BigInt> for Value {
    fn from(int: BigInt) -> Self {
        Self::Int(int)
    }
}

impl From<bool> for Value {
    fn from(boolean: bool) -> Self {
        Self::Bool(boolean)
    }
}

impl From<[u8; ADDRESS_BYTES]> for Value {
    fn from(address: [u8; ADDRESS_BYTES]) -> Self {
        Self::Address(address)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(uint) => write!(f, "{uint}"),
            Self::Int(int) => write!(f, "{int}"),
            Self::Address(address) => write!(f, "0x{}", hex::encode(address)),
            Self::Bool(boolean) => write!(f, "{boolean}"),
            Self::FixedBytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

/// The types of a record's values, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeafSchema(Vec<AbiType>);

impl LeafSchema {
    pub const fn new(types: Vec<AbiType>) -> Self {
        Self(types)
    }

    /// Parse a schema from Solidity type names, _e.g._, `["uint256", "address"]`.
    pub fn parse<S: AsRef<str>>(types: &[S]) -> Result<Self, EncodingError> {
        let types = types.iter().map(|t| t.as_ref().parse()).try_collect()?;
        Ok(Self(types))
    }

    pub fn types(&self) -> &[AbiType] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a record from the textual representation of its values.
    /// See [`AbiType::parse_value`].
    pub fn parse_record<S: AsRef<str>>(&self, values: &[S]) -> Result<Record, EncodingError> {
        self.check_arity(values.len())?;
        self.0
            .iter()
            .zip(values)
            .map(|(abi_type, value)| abi_type.parse_value(value.as_ref()))
            .try_collect()
    }

    /// The `abi.encode` of `record`.
    pub fn encode(&self, record: &[Value]) -> Result<Vec<u8>, EncodingError> {
        self.check_arity(record.len())?;

        let mut encoding = Vec::with_capacity(record.len() * WORD_BYTES);
        for (position, (abi_type, value)) in self.0.iter().zip(record).enumerate() {
            encoding.extend(abi_type.encode_word(position, value)?);
        }

        Ok(encoding)
    }

    /// The leaf digest of `record`: `keccak256(keccak256(abi.encode(record)))`.
    pub fn leaf_hash(&self, record: &[Value]) -> Result<Digest, EncodingError> {
        Ok(keccak::leaf_hash(self.encode(record)?))
    }

    fn check_arity(&self, actual: usize) -> Result<(), EncodingError> {
        if actual != self.len() {
            return Err(EncodingError::ArityMismatch {
                expected: self.len(),
                actual,
            });
        }
        Ok(())
    }
}

impl FromIterator<AbiType> for LeafSchema {
    fn from_iter<I: IntoIterator<Item = AbiType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for LeafSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.iter().join(","))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    fn ticket_schema() -> LeafSchema {
        LeafSchema::new(vec![AbiType::UINT256, AbiType::Address])
    }

    fn word(hex_str: &str) -> Vec<u8> {
        let bytes = hex::decode(hex_str).unwrap();
        assert_eq!(WORD_BYTES, bytes.len());
        bytes
    }

    #[test]
    fn type_names_round_trip() {
        let names = ["uint8", "uint256", "int16", "int256", "address", "bool", "bytes1", "bytes32"];
        for name in names {
            let abi_type: AbiType = name.parse().unwrap();
            assert_eq!(name, abi_type.to_string());
        }
        assert_eq!(AbiType::UINT256, "uint".parse().unwrap());
        assert_eq!(AbiType::INT256, "int".parse().unwrap());
    }

    #[test]
    fn unsupported_type_names_are_rejected() {
        let names = ["uint0", "uint7", "uint264", "bytes", "bytes0", "bytes33", "string", "address[]", ""];
        for name in names {
            let err = name.parse::<AbiType>().unwrap_err();
            assert_eq!(EncodingError::UnknownType(name.to_string()), err);
        }
    }

    #[test]
    fn schema_serializes_as_type_names() -> Result<(), serde_json::Error> {
        let schema = ticket_schema();
        let json = serde_json::to_string(&schema)?;
        assert_eq!(r#"["uint256","address"]"#, json);
        assert_eq!(schema, serde_json::from_str(&json)?);
        assert!(serde_json::from_str::<LeafSchema>(r#"["uint256","string"]"#).is_err());
        Ok(())
    }

    #[test]
    fn encode_ticket_record() {
        let schema = ticket_schema();
        let record = schema
            .parse_record(&["2", "0x8105660Af15a4eB54Fa0571BC84DFBEC0294A99A"])
            .unwrap();
        let encoding = schema.encode(&record).unwrap();

        let expected = [
            word("0000000000000000000000000000000000000000000000000000000000000002"),
            word("0000000000000000000000008105660af15a4eb54fa0571bc84dfbec0294a99a"),
        ]
        .concat();
        assert_eq!(expected, encoding);
    }

    #[test]
    fn leaf_hash_of_ticket_record_matches_known_value() {
        let schema = ticket_schema();
        let record = schema
            .parse_record(&["0", "0x7F1d642DbfD62aD4A8fA9810eA619707d09825D0"])
            .unwrap();
        let expected = "0x4e8e7b804863c62791900e4fb82c38e5fdf1f780e8191a2c9cfa428a67d42114";
        assert_eq!(expected, schema.leaf_hash(&record).unwrap().to_hex());
    }

    #[test]
    fn encode_signed_integers() {
        let schema = LeafSchema::parse(&["int8", "int256", "int16"]).unwrap();
        let record = vec![Value::from(-1_i64), Value::from(-128_i64), Value::from(300_i64)];
        let expected = [
            word("ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
            word("ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff80"),
            word("000000000000000000000000000000000000000000000000000000000000012c"),
        ]
        .concat();
        assert_eq!(expected, schema.encode(&record).unwrap());
    }

    #[test]
    fn encode_bool_and_fixed_bytes() {
        let schema = LeafSchema::parse(&["bool", "bytes4", "bool"]).unwrap();
        let record = schema.parse_record(&["true", "0xdeadbeef", "false"]).unwrap();
        let expected = [
            word("0000000000000000000000000000000000000000000000000000000000000001"),
            word("deadbeef00000000000000000000000000000000000000000000000000000000"),
            word("0000000000000000000000000000000000000000000000000000000000000000"),
        ]
        .concat();
        assert_eq!(expected, schema.encode(&record).unwrap());
    }

    #[test]
    fn integer_bounds_are_enforced() {
        let uint8 = LeafSchema::parse(&["uint8"]).unwrap();
        assert!(uint8.encode(&[Value::from(255_u64)]).is_ok());
        assert_eq!(
            EncodingError::IntegerOverflow {
                position: 0,
                expected: AbiType::Uint(8)
            },
            uint8.encode(&[Value::from(256_u64)]).unwrap_err()
        );

        let int8 = LeafSchema::parse(&["int8"]).unwrap();
        assert!(int8.encode(&[Value::from(127_i64)]).is_ok());
        assert!(int8.encode(&[Value::from(-128_i64)]).is_ok());
        assert!(int8.encode(&[Value::from(128_i64)]).is_err());
        assert!(int8.encode(&[Value::from(-129_i64)]).is_err());

        let uint256 = LeafSchema::new(vec![AbiType::UINT256]);
        let max = (BigUint::from(1_u8) << 256_u32) - 1_u8;
        assert!(uint256.encode(&[Value::from(max.clone())]).is_ok());
        assert!(uint256.encode(&[Value::from(max + 1_u8)]).is_err());
    }

    #[test]
    fn out_of_range_widths_are_rejected_when_encoding() {
        let wide_uint = LeafSchema::new(vec![AbiType::Uint(512)]);
        let large = BigUint::from(1_u8) << 300_u32;
        assert_eq!(
            EncodingError::UnknownType("uint512".to_string()),
            wide_uint.encode(&[Value::from(large)]).unwrap_err()
        );

        let wide_int = LeafSchema::new(vec![AbiType::Int(264)]);
        assert_eq!(
            EncodingError::UnknownType("int264".to_string()),
            wide_int.encode(&[Value::from(-1_i64)]).unwrap_err()
        );

        let odd_uint = LeafSchema::new(vec![AbiType::Uint(7)]);
        assert!(odd_uint.leaf_hash(&[Value::from(1_u64)]).is_err());

        let wide_bytes = LeafSchema::new(vec![AbiType::FixedBytes(40)]);
        assert_eq!(
            EncodingError::UnknownType("bytes40".to_string()),
            wide_bytes.encode(&[Value::FixedBytes(vec![7; 40])]).unwrap_err()
        );

        let empty_bytes = LeafSchema::new(vec![AbiType::FixedBytes(0)]);
        assert!(empty_bytes.encode(&[Value::FixedBytes(vec![])]).is_err());
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let schema = ticket_schema();
        let err = schema.encode(&[Value::from(1_u64)]).unwrap_err();
        assert_eq!(
            EncodingError::ArityMismatch {
                expected: 2,
                actual: 1
            },
            err
        );

        let err = schema.parse_record(&["1", "0x00", "2"]).unwrap_err();
        assert!(matches!(err, EncodingError::ArityMismatch { actual: 3, .. }));
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let schema = ticket_schema();
        let record = vec![Value::from(true), Value::Address([0; ADDRESS_BYTES])];
        let err = schema.encode(&record).unwrap_err();
        assert_eq!(
            EncodingError::TypeMismatch {
                position: 0,
                expected: AbiType::UINT256
            },
            err
        );
    }

    #[test]
    fn wrong_fixed_bytes_length_is_an_error() {
        let schema = LeafSchema::parse(&["bytes4"]).unwrap();
        let err = schema.encode(&[Value::FixedBytes(vec![1, 2, 3])]).unwrap_err();
        assert!(matches!(
            err,
            EncodingError::InvalidByteLength {
                needed: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn malformed_values_do_not_parse() {
        let bad_inputs = [
            (AbiType::UINT256, "-1"),
            (AbiType::UINT256, "twelve"),
            (AbiType::UINT256, "0xzz"),
            (AbiType::Address, "7F1d642DbfD62aD4A8fA9810eA619707d09825D0"),
            (AbiType::Address, "0x7F1d642DbfD62aD4A8fA9810eA619707d09825"),
            (AbiType::Bool, "1"),
            (AbiType::FixedBytes(2), "0xabc"),
        ];
        for (abi_type, input) in bad_inputs {
            let err = abi_type.parse_value(input).unwrap_err();
            assert!(
                matches!(err, EncodingError::InvalidValue { .. }),
                "`{input}` must not parse as `{abi_type}`"
            );
        }
    }

    #[test]
    fn hex_and_decimal_integers_agree() {
        let decimal = AbiType::UINT256.parse_value("255").unwrap();
        let hex = AbiType::UINT256.parse_value("0xff").unwrap();
        assert_eq!(decimal, hex);

        let negative = AbiType::INT256.parse_value("-0x10").unwrap();
        assert_eq!(Value::from(-16_i64), negative);
    }

    #[proptest]
    fn uint_word_is_left_padded_big_endian(value: u64) {
        let schema = LeafSchema::new(vec![AbiType::Uint(64)]);
        let encoding = schema.encode(&[Value::from(value)]).unwrap();
        prop_assert_eq!(&[0_u8; 24], &encoding[..24]);
        let expected = value.to_be_bytes();
        prop_assert_eq!(expected.as_slice(), &encoding[24..]);
    }

    #[proptest]
    fn int_word_is_sign_extended(value: i64) {
        let schema = LeafSchema::new(vec![AbiType::Int(64)]);
        let encoding = schema.encode(&[Value::from(value)]).unwrap();
        let fill = if value < 0 { 0xff } else { 0 };
        prop_assert!(encoding[..24].iter().all(|&b| b == fill));
        let expected = value.to_be_bytes();
        prop_assert_eq!(expected.as_slice(), &encoding[24..]);
    }

    #[proptest]
    fn distinct_records_have_distinct_encodings(
        a: (u64, [u8; ADDRESS_BYTES]),
        #[filter(#a != #b)]
        b: (u64, [u8; ADDRESS_BYTES]),
    ) {
        let schema = ticket_schema();
        let record_a = vec![Value::from(a.0), Value::from(a.1)];
        let record_b = vec![Value::from(b.0), Value::from(b.1)];
        prop_assert_ne!(schema.encode(&record_a).unwrap(), schema.encode(&record_b).unwrap());
    }

    #[proptest]
    fn displayed_values_parse_back(value: u64, address: [u8; ADDRESS_BYTES], flag: bool) {
        let schema = LeafSchema::parse(&["uint256", "address", "bool"]).unwrap();
        let record = vec![Value::from(value), Value::from(address), Value::from(flag)];
        let texts = record.iter().map(|v| v.to_string()).collect_vec();
        prop_assert_eq!(record, schema.parse_record(&texts).unwrap());
    }
}
