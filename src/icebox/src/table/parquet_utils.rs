/// Parquet writer defaults for data files.
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

const DEFAULT_COMPRESSION: Compression = Compression::SNAPPY;

pub(crate) fn default_writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(DEFAULT_COMPRESSION)
        .set_dictionary_enabled(true)
        .build()
}
