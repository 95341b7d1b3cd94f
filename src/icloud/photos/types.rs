/// Download location and metadata of one rendition of an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetVersion {
    pub size: u64,
    pub url: String,
    pub asset_type: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetItemType {
    Image,
    Movie,
}
