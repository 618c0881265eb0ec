//! Binary encoding for messages crossing the native boundary
//!
//! Little-endian throughout. Integers are i32, floats f32, addresses 8-byte
//! signed, lists an i32 count followed by the items, strings a u32 byte
//! length followed by UTF-8. No pixel data is ever encoded; buffers travel
//! as an address plus dimensions.

use super::document::DocumentSource;
use super::error::{OpenError, RenderError, WireError};
use super::request::{RenderRequest, RenderResponse};
use super::types::{BufferDimensions, BufferInfo, PageTransform};

/// Append-only message writer.
#[derive(Debug, Default)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf
            .extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    pub fn put_list<T: Pack>(&mut self, items: &[T]) {
        self.put_i32(items.len() as i32);
        for item in items {
            item.pack(self);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received message.
#[derive(Debug)]
pub struct Unpacker<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Unpacker<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < needed {
            return Err(WireError::UnexpectedEof {
                offset: self.offset,
                needed,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        self.take_array().map(i32::from_le_bytes)
    }

    pub fn get_f32(&mut self) -> Result<f32, WireError> {
        self.take_array().map(f32::from_le_bytes)
    }

    pub fn get_i64(&mut self) -> Result<i64, WireError> {
        self.take_array().map(i64::from_le_bytes)
    }

    pub fn get_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = u32::from_le_bytes(self.take_array()?) as usize;
        self.take(len)
    }

    pub fn get_str(&mut self) -> Result<String, WireError> {
        let bytes = self.get_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::Utf8)
    }

    pub fn get_list<T: Pack>(&mut self) -> Result<Vec<T>, WireError> {
        let count = self.get_i32()?;
        if count < 0 {
            return Err(WireError::NegativeLength(count));
        }
        // Cap the preallocation by what the input could possibly hold.
        let mut items = Vec::with_capacity((count as usize).min(self.remaining()));
        for _ in 0..count {
            items.push(T::unpack(self)?);
        }
        Ok(items)
    }

    /// Fails when unread bytes are left over.
    pub fn finish(self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireError::Trailing(n)),
        }
    }
}

/// A message with a fixed binary layout.
pub trait Pack: Sized {
    fn pack(&self, packer: &mut Packer);
    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError>;
}

/// Encodes a single message.
#[must_use]
pub fn to_bytes<T: Pack>(value: &T) -> Vec<u8> {
    let mut packer = Packer::new();
    value.pack(&mut packer);
    packer.into_bytes()
}

/// Decodes a single message that must span all of `bytes`.
pub fn from_bytes<T: Pack>(bytes: &[u8]) -> Result<T, WireError> {
    let mut unpacker = Unpacker::new(bytes);
    let value = T::unpack(&mut unpacker)?;
    unpacker.finish()?;
    Ok(value)
}

impl Pack for () {
    fn pack(&self, _: &mut Packer) {}

    fn unpack(_: &mut Unpacker<'_>) -> Result<Self, WireError> {
        Ok(())
    }
}

impl Pack for i32 {
    fn pack(&self, packer: &mut Packer) {
        packer.put_i32(*self);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError> {
        unpacker.get_i32()
    }
}

/// Raw f32 sequence without a count, read until the input is exhausted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatList(pub Vec<f32>);

impl Pack for FloatList {
    fn pack(&self, packer: &mut Packer) {
        for value in &self.0 {
            packer.put_f32(*value);
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError> {
        let mut values = Vec::with_capacity(unpacker.remaining() / 4);
        while unpacker.remaining() > 0 {
            values.push(unpacker.get_f32()?);
        }
        Ok(Self(values))
    }
}

#[must_use]
pub fn pack_floats(values: &[f32]) -> Vec<u8> {
    to_bytes(&FloatList(values.to_vec()))
}

pub fn unpack_floats(bytes: &[u8]) -> Result<Vec<f32>, WireError> {
    from_bytes::<FloatList>(bytes).map(|list| list.0)
}

impl Pack for PageTransform {
    fn pack(&self, packer: &mut Packer) {
        packer.put_i32(self.page_index);
        packer.put_i32(self.top_cutoff);
        packer.put_i32(self.bottom_cutoff);
        packer.put_i32(self.left_cutoff);
        packer.put_i32(self.right_cutoff);
        packer.put_i32(self.scaled_width);
        packer.put_i32(self.scaled_height);
        packer.put_i32(self.top_gap);
        packer.put_f32(self.scale);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError> {
        Ok(Self {
            page_index: unpacker.get_i32()?,
            top_cutoff: unpacker.get_i32()?,
            bottom_cutoff: unpacker.get_i32()?,
            left_cutoff: unpacker.get_i32()?,
            right_cutoff: unpacker.get_i32()?,
            scaled_width: unpacker.get_i32()?,
            scaled_height: unpacker.get_i32()?,
            top_gap: unpacker.get_i32()?,
            scale: unpacker.get_f32()?,
        })
    }
}

impl Pack for BufferInfo {
    fn pack(&self, packer: &mut Packer) {
        packer.put_i32(self.dimensions.width);
        packer.put_i32(self.dimensions.height);
        packer.put_i32(self.dimensions.stride);
        packer.put_i64(self.address as i64);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError> {
        let dimensions = BufferDimensions {
            width: unpacker.get_i32()?,
            height: unpacker.get_i32()?,
            stride: unpacker.get_i32()?,
        };
        Ok(dimensions.with_address(unpacker.get_i64()? as u64))
    }
}

impl Pack for RenderRequest {
    fn pack(&self, packer: &mut Packer) {
        packer.put_list(&self.transforms);
        packer.put_i32(self.page_spacing);
        packer.put_i32(self.top_offset);
        self.buffer.pack(packer);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError> {
        Ok(Self {
            transforms: unpacker.get_list()?,
            page_spacing: unpacker.get_i32()?,
            top_offset: unpacker.get_i32()?,
            buffer: BufferInfo::unpack(unpacker)?,
        })
    }
}

impl Pack for RenderResponse {
    fn pack(&self, packer: &mut Packer) {
        packer.put_list(&self.transforms);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError> {
        Ok(Self {
            transforms: unpacker.get_list()?,
        })
    }
}

const SOURCE_PATH: u8 = 0;
const SOURCE_BYTES: u8 = 1;

impl Pack for DocumentSource {
    fn pack(&self, packer: &mut Packer) {
        match self {
            Self::Path(path) => {
                packer.put_u8(SOURCE_PATH);
                packer.put_str(&path.to_string_lossy());
            }
            Self::Bytes(bytes) => {
                packer.put_u8(SOURCE_BYTES);
                packer.put_bytes(bytes);
            }
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError> {
        match unpacker.get_u8()? {
            SOURCE_PATH => Ok(Self::Path(unpacker.get_str()?.into())),
            SOURCE_BYTES => Ok(Self::Bytes(unpacker.get_bytes()?.to_vec())),
            tag => Err(WireError::InvalidTag {
                what: "document source",
                tag,
            }),
        }
    }
}

/// Failure reported by the native side of the boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeFault {
    pub code: i32,
    pub message: String,
    pub trace: String,
}

impl NativeFault {
    /// Fault code for failures that are not open errors.
    pub const CODE_RENDER: i32 = 0;

    #[must_use]
    pub fn render(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            code: Self::CODE_RENDER,
            message: message.into(),
            trace: trace.into(),
        }
    }
}

impl From<&OpenError> for NativeFault {
    fn from(error: &OpenError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            trace: String::new(),
        }
    }
}

impl From<&RenderError> for NativeFault {
    fn from(error: &RenderError) -> Self {
        match error {
            RenderError::Native { message, trace } => Self::render(message.clone(), trace.clone()),
            other => Self::render(other.to_string(), String::new()),
        }
    }
}

impl From<NativeFault> for RenderError {
    fn from(fault: NativeFault) -> Self {
        Self::Native {
            message: fault.message,
            trace: fault.trace,
        }
    }
}

impl From<NativeFault> for OpenError {
    fn from(fault: NativeFault) -> Self {
        Self::from_code(fault.code, &fault.message).unwrap_or(Self::Unknown(fault.message))
    }
}

const RESULT_OK: u8 = 0;
const RESULT_ERR: u8 = 1;

/// Wraps a result in the boundary envelope: tag, then payload or fault.
#[must_use]
pub fn pack_result<T: Pack>(result: &Result<T, NativeFault>) -> Vec<u8> {
    let mut packer = Packer::new();
    match result {
        Ok(value) => {
            packer.put_u8(RESULT_OK);
            value.pack(&mut packer);
        }
        Err(fault) => {
            packer.put_u8(RESULT_ERR);
            packer.put_i32(fault.code);
            packer.put_str(&fault.message);
            packer.put_str(&fault.trace);
        }
    }
    packer.into_bytes()
}

/// Unwraps a boundary envelope.
///
/// The outer error is a malformed envelope, the inner one a fault the
/// native side reported.
pub fn unpack_result<T: Pack>(bytes: &[u8]) -> Result<Result<T, NativeFault>, WireError> {
    let mut unpacker = Unpacker::new(bytes);
    let result = match unpacker.get_u8()? {
        RESULT_OK => Ok(T::unpack(&mut unpacker)?),
        RESULT_ERR => Err(NativeFault {
            code: unpacker.get_i32()?,
            message: unpacker.get_str()?,
            trace: unpacker.get_str()?,
        }),
        tag => return Err(WireError::InvalidTag { what: "result", tag }),
    };
    unpacker.finish()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odd_transform() -> PageTransform {
        PageTransform {
            page_index: i32::MAX,
            top_cutoff: -1,
            bottom_cutoff: 0,
            left_cutoff: i32::MIN,
            right_cutoff: 17,
            scaled_width: 2000,
            scaled_height: 2828,
            top_gap: 200,
            scale: -0.0,
        }
    }

    #[test]
    fn transform_layout_is_fixed() {
        let bytes = to_bytes(&PageTransform::full_page(2, 10, 0.5, 1.0));
        assert_eq!(bytes.len(), 9 * 4);
        assert_eq!(&bytes[0..4], &2i32.to_le_bytes());
        assert_eq!(&bytes[20..24], &10i32.to_le_bytes());
        assert_eq!(&bytes[24..28], &20i32.to_le_bytes());
        assert_eq!(&bytes[32..36], &1.0f32.to_le_bytes());
    }

    #[test]
    fn transform_round_trip_with_boundary_values() {
        let t = odd_transform();
        let back: PageTransform = from_bytes(&to_bytes(&t)).unwrap();
        assert_eq!(back, t);
        assert!(back.scale.is_sign_negative());
    }

    #[test]
    fn request_round_trip() {
        let request = RenderRequest {
            transforms: vec![odd_transform(), PageTransform::full_page(0, 5, 1.0, 2.0)],
            page_spacing: 8,
            top_offset: -3,
            buffer: BufferDimensions::packed(1000, 1500).with_address(u64::MAX - 7),
        };
        let bytes = to_bytes(&request);
        assert_eq!(bytes.len(), 4 + 2 * 36 + 4 + 4 + 3 * 4 + 8);
        assert_eq!(from_bytes::<RenderRequest>(&bytes).unwrap(), request);
    }

    #[test]
    fn empty_response_round_trip() {
        let response = RenderResponse::default();
        assert_eq!(to_bytes(&response), 0i32.to_le_bytes().to_vec());
        assert_eq!(from_bytes::<RenderResponse>(&to_bytes(&response)).unwrap(), response);
    }

    #[test]
    fn floats_have_no_count() {
        let values = [1.0, 0.707, -3.5, f32::MAX];
        let bytes = pack_floats(&values);
        assert_eq!(bytes.len(), 16);
        assert_eq!(unpack_floats(&bytes).unwrap(), values.to_vec());
        assert_eq!(unpack_floats(&[]).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn ragged_float_payload_is_rejected() {
        let mut bytes = pack_floats(&[1.0]);
        bytes.push(0);
        assert_eq!(
            unpack_floats(&bytes),
            Err(WireError::UnexpectedEof {
                offset: 4,
                needed: 4
            })
        );
    }

    #[test]
    fn document_source_round_trip() {
        let path = DocumentSource::Path("/tmp/a b.pdf".into());
        assert_eq!(from_bytes::<DocumentSource>(&to_bytes(&path)).unwrap(), path);
        let bytes = DocumentSource::Bytes(vec![0x25, 0x50, 0x44, 0x46]);
        assert_eq!(from_bytes::<DocumentSource>(&to_bytes(&bytes)).unwrap(), bytes);
        assert_eq!(
            from_bytes::<DocumentSource>(&[9]),
            Err(WireError::InvalidTag {
                what: "document source",
                tag: 9
            })
        );
    }

    #[test]
    fn result_envelope() {
        let ok: Result<i32, NativeFault> = Ok(42);
        assert_eq!(unpack_result::<i32>(&pack_result(&ok)).unwrap(), ok);

        let err: Result<i32, NativeFault> = Err(NativeFault {
            code: OpenError::CODE_PASSWORD,
            message: "needs password".into(),
            trace: "at open".into(),
        });
        let back = unpack_result::<i32>(&pack_result(&err)).unwrap();
        assert_eq!(back, err);
        let open: OpenError = back.unwrap_err().into();
        assert_eq!(open, OpenError::Password);
    }

    #[test]
    fn unknown_fault_code_maps_to_unknown() {
        let fault = NativeFault::render("boom", "");
        assert_eq!(OpenError::from(fault), OpenError::Unknown("boom".into()));
    }

    #[test]
    fn malformed_input() {
        assert_eq!(
            from_bytes::<RenderResponse>(&(-1i32).to_le_bytes()),
            Err(WireError::NegativeLength(-1))
        );
        assert!(matches!(
            from_bytes::<RenderResponse>(&5i32.to_le_bytes()),
            Err(WireError::UnexpectedEof { .. })
        ));
        let mut bytes = to_bytes(&7i32);
        bytes.push(1);
        assert_eq!(from_bytes::<i32>(&bytes), Err(WireError::Trailing(1)));
        assert_eq!(
            unpack_result::<()>(&[3]),
            Err(WireError::InvalidTag {
                what: "result",
                tag: 3
            })
        );
    }

    #[test]
    fn invalid_utf8_string() {
        let mut packer = Packer::new();
        packer.put_bytes(&[0xff, 0xfe]);
        let bytes = packer.into_bytes();
        assert_eq!(Unpacker::new(&bytes).get_str(), Err(WireError::Utf8));
    }
}
