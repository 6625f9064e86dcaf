use std::{fs, path::Path};

use anyhow::{Context, Error};
use schemars::schema_for;

use crate::node::Node;
use crate::plaid::{PlaidCredentials, PlaidNode};

/// Write the node definition and credential schemas into `out_dir`, returning
/// the file names written.
pub fn write_schema(out_dir: &Path) -> Result<Vec<String>, Error> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("could not create {}", out_dir.display()))?;

    let schemas = [
        ("node.schema.json", schema_for!(Node)),
        ("plaid-node.schema.json", schema_for!(PlaidNode)),
        ("plaid-credentials.schema.json", schema_for!(PlaidCredentials)),
    ];

    let mut written = Vec::with_capacity(schemas.len());
    for (name, schema) in schemas {
        let json = serde_json::to_string_pretty(&schema)?;
        fs::write(out_dir.join(name), json)
            .with_context(|| format!("could not write {}", name))?;
        written.push(name.to_string());
    }
    Ok(written)
}
