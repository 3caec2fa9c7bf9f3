use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{DeriveInput, LitStr, parse_macro_input};

/// Implements `ros2_reentrant_node::NodeScope` for a node state type.
///
/// The node name defaults to the snake_case form of the type name and can be
/// overridden with `#[node_scope(name = "...")]`.
#[proc_macro_derive(NodeScope, attributes(node_scope))]
pub fn derive_node_scope(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = input.ident;

    let mut node_name: Option<LitStr> = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("node_scope") {
            continue;
        }
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                node_name = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported node_scope attribute, expected `name`"))
            }
        });
        if let Err(err) = parsed {
            return err.to_compile_error().into();
        }
    }

    let node_name = node_name
        .unwrap_or_else(|| LitStr::new(&to_snake_case(&name.to_string()), Span::call_site()));
    if let Err(reason) = check_node_name(&node_name.value()) {
        return syn::Error::new(node_name.span(), format!("invalid node name: {reason}"))
            .to_compile_error()
            .into();
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::ros2_reentrant_node::NodeScope for #name #ty_generics #where_clause {
            const NODE_NAME: &'static str = #node_name;
        }
    };

    TokenStream::from(expanded)
}

fn to_snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    let mut prev_lower = false;
    for c in ident.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

// Mirrors the runtime check in `names.rs` so bad names fail at compile time.
fn check_node_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("must not be empty");
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err("must not start with a digit");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("may only contain alphanumerics and underscores");
    }
    Ok(())
}
