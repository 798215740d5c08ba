pub mod hospitals_archive;
pub mod watermark;
