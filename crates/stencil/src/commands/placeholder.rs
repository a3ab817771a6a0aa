/*
 * placeholder.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Placeholder command: prints the expression for a field path.

use anyhow::Result;

use stencil_render::build_expression;

/// Arguments for the placeholder command
#[derive(Debug)]
pub struct PlaceholderArgs {
    pub field: String,
    pub sub_field: Option<String>,
    pub default: Option<String>,
}

/// Execute the placeholder command
pub fn execute(args: PlaceholderArgs) -> Result<()> {
    println!("{}", expression(&args));
    Ok(())
}

fn expression(args: &PlaceholderArgs) -> String {
    build_expression(&args.field, args.sub_field.as_deref(), args.default.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expression() {
        let args = PlaceholderArgs {
            field: "partner_id".to_string(),
            sub_field: Some("email".to_string()),
            default: Some("n/a".to_string()),
        };
        assert_eq!(expression(&args), "${object.partner_id.email or '''n/a'''}");
    }
}
