/*
 * fields.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Fields command implementation
 */

//! Lists the public fields of a model, one per line, as
//! `name<TAB>type[<TAB>relation]`. Private fields are never listed.

use std::path::PathBuf;

use anyhow::{Context, Result};

use stencil_render::{FieldSchema, MemoryRecordStore, suggest_fields};

/// Arguments for the fields command
#[derive(Debug)]
pub struct FieldsArgs {
    pub store: PathBuf,
    pub model: String,
    pub prefix: String,
}

/// Execute the fields command
pub fn execute(args: FieldsArgs) -> Result<()> {
    for line in run(&args)? {
        println!("{line}");
    }
    Ok(())
}

fn run(args: &FieldsArgs) -> Result<Vec<String>> {
    let store = MemoryRecordStore::from_path(&args.store)
        .with_context(|| format!("Failed to load record store {}", args.store.display()))?;
    let fields = suggest_fields(&store, &args.model, &args.prefix)?;
    Ok(fields.iter().map(describe).collect())
}

fn describe(field: &FieldSchema) -> String {
    match &field.relation {
        Some(relation) => format!("{}\t{}\t{}", field.name, field.field_type.as_str(), relation),
        None => format!("{}\t{}", field.name, field.field_type.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_lists_public_fields() {
        let mut store = tempfile::NamedTempFile::new().unwrap();
        write!(
            store,
            r#"{{"models": {{"sale.order": {{"fields": [
                {{"name": "name", "type": "char"}},
                {{"name": "partner_id", "type": "many2one", "relation": "res.partner"}},
                {{"name": "access_token", "type": "char", "public": false}}
            ]}}}}}}"#
        )
        .unwrap();

        let args = |prefix: &str| FieldsArgs {
            store: store.path().to_path_buf(),
            model: "sale.order".to_string(),
            prefix: prefix.to_string(),
        };
        assert_eq!(
            run(&args("")).unwrap(),
            vec!["name\tchar", "partner_id\tmany2one\tres.partner"]
        );
        assert_eq!(run(&args("p")).unwrap(), vec!["partner_id\tmany2one\tres.partner"]);
        assert!(run(&args("a")).unwrap().is_empty());
    }
}
