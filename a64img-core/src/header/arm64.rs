use crate::header::flags::HeaderFlags;
use crate::header::Header;
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io;

/// Size of the ARM64 Image header on disk.
pub const HEADER_SIZE: usize = 64;

/// `ARM\x64` read as a little-endian `u32`.
pub const ARM64_IMAGE_MAGIC: u32 = 0x644d_5241;

/// `b #0x40`: jumps over the header to the first payload instruction.
pub const BRANCH_PAST_HEADER: u32 = 0x1400_0010;

pub const DEFAULT_LOAD_OFFSET: u64 = 0;

/// The header the Linux arm64 boot protocol expects at the start of an `Image`.
///
/// All fields are little-endian and laid out back to back with no padding:
///
/// | Offset | Field         | Size |
/// |--------|---------------|------|
/// | 0x00   | `code0`       | 4    |
/// | 0x04   | `code1`       | 4    |
/// | 0x08   | `text_offset` | 8    |
/// | 0x10   | `image_size`  | 8    |
/// | 0x18   | `flags`       | 8    |
/// | 0x20   | `res2`        | 8    |
/// | 0x28   | `res3`        | 8    |
/// | 0x30   | `res4`        | 8    |
/// | 0x38   | `magic`       | 4    |
/// | 0x3c   | `res5`        | 4    |
///
/// Reference: [Booting AArch64 Linux](https://www.kernel.org/doc/html/latest/arch/arm64/booting.html)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// First instruction executed by the loader.
    ///
    /// Must branch past the header, see [`BRANCH_PAST_HEADER`].
    pub code0: u32,

    /// Second instruction slot, unused.
    pub code1: u32,

    /// Image load offset from the start of RAM.
    pub text_offset: u64,

    /// Effective image size, header included.
    pub image_size: u64,

    /// Endianness, page size and placement bits. See [`HeaderFlags`].
    pub flags: u64,

    pub res2: u64,
    pub res3: u64,
    pub res4: u64,

    /// Always [`ARM64_IMAGE_MAGIC`] in a well-formed image.
    pub magic: u32,

    pub res5: u32,
}

impl ImageHeader {
    /// Header for a flat payload of `payload_len` bytes loaded at `load_offset`.
    ///
    /// Flags stay zero: little-endian kernel, 4K pages, placed near the base of DRAM.
    pub fn for_payload(payload_len: usize, load_offset: u64) -> Self {
        ImageHeader {
            code0: BRANCH_PAST_HEADER,
            code1: 0,
            text_offset: load_offset,
            image_size: payload_len as u64 + HEADER_SIZE as u64,
            flags: 0,
            res2: 0,
            res3: 0,
            res4: 0,
            magic: ARM64_IMAGE_MAGIC,
            res5: 0,
        }
    }

    pub fn header_flags(&self) -> HeaderFlags {
        HeaderFlags::from(self.flags)
    }

    /// Writes the fields in on-disk order.
    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_u32::<LE>(self.code0)?;
        out.write_u32::<LE>(self.code1)?;
        out.write_u64::<LE>(self.text_offset)?;
        out.write_u64::<LE>(self.image_size)?;
        out.write_u64::<LE>(self.flags)?;
        out.write_u64::<LE>(self.res2)?;
        out.write_u64::<LE>(self.res3)?;
        out.write_u64::<LE>(self.res4)?;
        out.write_u32::<LE>(self.magic)?;
        out.write_u32::<LE>(self.res5)?;
        Ok(())
    }

    /// Serialises the header.
    ///
    /// # Panics
    ///
    /// Panics if the packed header is not exactly [`HEADER_SIZE`] bytes.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        self.write_to(&mut buf)?;
        assert_eq!(
            buf.len(),
            HEADER_SIZE,
            "ARM64 Image header packed to {} bytes",
            buf.len()
        );
        Ok(buf)
    }

    pub fn from_reader<R: io::Read>(cur: &mut R) -> io::Result<ImageHeader> {
        Ok(ImageHeader {
            code0: cur.read_u32::<LE>()?,
            code1: cur.read_u32::<LE>()?,
            text_offset: cur.read_u64::<LE>()?,
            image_size: cur.read_u64::<LE>()?,
            flags: cur.read_u64::<LE>()?,
            res2: cur.read_u64::<LE>()?,
            res3: cur.read_u64::<LE>()?,
            res4: cur.read_u64::<LE>()?,
            magic: cur.read_u32::<LE>()?,
            res5: cur.read_u32::<LE>()?,
        })
    }
}

impl Header for ImageHeader {
    fn format_name(&self) -> &'static str {
        "ARM64 Image"
    }

    fn load_offset(&self) -> u64 {
        self.text_offset
    }

    fn image_size(&self) -> u64 {
        self.image_size
    }

    fn has_valid_magic(&self) -> bool {
        self.magic == ARM64_IMAGE_MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn le_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn le_u64(bytes: &[u8], at: usize) -> u64 {
        u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
    }

    #[test]
    fn struct_matches_on_disk_size() {
        assert_eq!(std::mem::size_of::<ImageHeader>(), HEADER_SIZE);
    }

    #[test]
    fn for_payload_fills_computed_fields() {
        let hdr = ImageHeader::for_payload(100, 0x80000);
        assert_eq!(hdr.code0, BRANCH_PAST_HEADER);
        assert_eq!(hdr.code1, 0);
        assert_eq!(hdr.text_offset, 0x80000);
        assert_eq!(hdr.image_size, 164);
        assert_eq!(hdr.flags, 0);
        assert_eq!((hdr.res2, hdr.res3, hdr.res4, hdr.res5), (0, 0, 0, 0));
        assert!(hdr.has_valid_magic());
    }

    #[test]
    fn fields_land_at_documented_offsets() {
        let hdr = ImageHeader {
            code0: 0x1111_1111,
            code1: 0x2222_2222,
            text_offset: 0x0303_0303_0303_0303,
            image_size: 0x0404_0404_0404_0404,
            flags: 0x0505_0505_0505_0505,
            res2: 0x0606_0606_0606_0606,
            res3: 0x0707_0707_0707_0707,
            res4: 0x0808_0808_0808_0808,
            magic: 0x0909_0909,
            res5: 0x0a0a_0a0a,
        };
        let bytes = hdr.to_bytes().unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(le_u32(&bytes, 0x00), hdr.code0);
        assert_eq!(le_u32(&bytes, 0x04), hdr.code1);
        assert_eq!(le_u64(&bytes, 0x08), hdr.text_offset);
        assert_eq!(le_u64(&bytes, 0x10), hdr.image_size);
        assert_eq!(le_u64(&bytes, 0x18), hdr.flags);
        assert_eq!(le_u64(&bytes, 0x20), hdr.res2);
        assert_eq!(le_u64(&bytes, 0x28), hdr.res3);
        assert_eq!(le_u64(&bytes, 0x30), hdr.res4);
        assert_eq!(le_u32(&bytes, 0x38), hdr.magic);
        assert_eq!(le_u32(&bytes, 0x3c), hdr.res5);
    }

    #[test]
    fn magic_spells_arm64_on_disk() {
        let bytes = ImageHeader::for_payload(0, 0).to_bytes().unwrap();
        assert_eq!(&bytes[0x38..0x3c], b"ARM\x64");
        assert_eq!(&bytes[0x00..0x04], &[0x10, 0x00, 0x00, 0x14]);
    }

    #[test]
    fn from_reader_decodes_serialised_header() {
        let hdr = ImageHeader::for_payload(4096, 0x20_0000);
        let bytes = hdr.to_bytes().unwrap();
        let decoded = ImageHeader::from_reader(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn from_reader_rejects_truncated_input() {
        let bytes = [0u8; HEADER_SIZE - 1];
        let err = ImageHeader::from_reader(&mut Cursor::new(&bytes[..])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn bad_magic_is_reported() {
        let mut hdr = ImageHeader::for_payload(0, 0);
        hdr.magic = 0xdead_beef;
        assert!(!hdr.has_valid_magic());
        assert_eq!(hdr.format_name(), "ARM64 Image");
    }
}
