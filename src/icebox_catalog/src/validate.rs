use icebox::error::{Error, Result};
use icebox::{NamespaceIdent, TableIdent};

/// Identifier checks shared by the catalog backends. Identifiers built
/// through the constructors are already well formed; these guard against
/// values deserialized from external input.
pub(crate) fn validate_namespace(namespace: &NamespaceIdent) -> Result<()> {
    if namespace.is_empty() || namespace.parts().iter().any(|p| p.is_empty()) {
        return Err(Error::invalid_identifier("namespace segments must be non-empty"));
    }
    Ok(())
}

pub(crate) fn validate_table_ident(identifier: &TableIdent) -> Result<()> {
    validate_namespace(identifier.namespace())?;
    if identifier.name().is_empty() {
        return Err(Error::invalid_identifier("table name must be non-empty"));
    }
    Ok(())
}
