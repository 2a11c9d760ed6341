pub mod arm64;
pub mod flags;

pub trait Header: std::fmt::Debug + Send + Sync {
    /// Returns a short human-readable name, e.g. "ARM64 Image".
    fn format_name(&self) -> &'static str;

    /// Returns the offset from the base of RAM at which the loader places the image.
    fn load_offset(&self) -> u64;

    /// Returns the image size recorded in the header, header bytes included.
    fn image_size(&self) -> u64;

    /// Returns true if the format magic matches.
    fn has_valid_magic(&self) -> bool;
}
