//! Type inspection helpers shared by the client expansion.

use quote::ToTokens;
use syn::{GenericArgument, PathArguments, ReturnType, Type};

/// Map types accepted as a header map when keyed by strings
const MAP_TYPES: &[&str] = &["HashMap", "BTreeMap", "IndexMap", "Map"];

/// Render a type the way it appears in method identities: tokens without whitespace
pub fn type_name(ty: &Type) -> String {
    ty.to_token_stream()
        .to_string()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Value type of a `Result<T>` / `Result<T, E>` return type
pub fn result_value_type(output: &ReturnType) -> Option<&Type> {
    let ReturnType::Type(_, ty) = output else {
        return None;
    };
    let Type::Path(path) = strip_group(ty) else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    }
}

pub fn is_unit(ty: &Type) -> bool {
    matches!(strip_group(ty), Type::Tuple(tuple) if tuple.elems.is_empty())
}

/// Whether `ty` is a string-keyed map, looking through references
pub fn is_string_map(ty: &Type) -> bool {
    let ty = match strip_group(ty) {
        Type::Reference(reference) => strip_group(&reference.elem),
        other => other,
    };
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(segment) = path.path.segments.last() else {
        return false;
    };
    if !MAP_TYPES.iter().any(|name| segment.ident == name) {
        return false;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return false;
    };
    match args.args.first() {
        Some(GenericArgument::Type(key)) => is_string(key),
        _ => false,
    }
}

fn is_string(ty: &Type) -> bool {
    match strip_group(ty) {
        Type::Reference(reference) => is_string(&reference.elem),
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == "String" || segment.ident == "str")
            .unwrap_or(false),
        _ => false,
    }
}

fn strip_group(ty: &Type) -> &Type {
    match ty {
        Type::Group(group) => strip_group(&group.elem),
        Type::Paren(paren) => strip_group(&paren.elem),
        other => other,
    }
}

/// `OrderClient` -> `order_client`
pub fn snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if previous_lower {
                snake.push('_');
            }
            snake.extend(c.to_lowercase());
            previous_lower = false;
        } else {
            snake.push(c);
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    snake
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_type_names_drop_whitespace() {
        let ty: Type = parse_quote!(HashMap<String, Vec<u8> >);
        assert_eq!(type_name(&ty), "HashMap<String,Vec<u8>>");
        let ty: Type = parse_quote!(&'a str);
        assert_eq!(type_name(&ty), "&'astr");
    }

    #[test]
    fn test_result_value_type() {
        let output: ReturnType = parse_quote!(-> Result<String>);
        assert_eq!(type_name(result_value_type(&output).unwrap()), "String");

        let output: ReturnType = parse_quote!(-> rabbitmesh_rpc::Result<()>);
        assert!(is_unit(result_value_type(&output).unwrap()));

        let output: ReturnType = parse_quote!(-> std::result::Result<Order, ClientError>);
        assert_eq!(type_name(result_value_type(&output).unwrap()), "Order");

        let output: ReturnType = parse_quote!(-> String);
        assert!(result_value_type(&output).is_none());
        assert!(result_value_type(&ReturnType::Default).is_none());
    }

    #[test]
    fn test_string_maps() {
        assert!(is_string_map(&parse_quote!(HashMap<String, String>)));
        assert!(is_string_map(&parse_quote!(std::collections::BTreeMap<String, i64>)));
        assert!(is_string_map(&parse_quote!(&HashMap<&'static str, Value>)));
        assert!(is_string_map(&parse_quote!(serde_json::Map<String, Value>)));
        assert!(!is_string_map(&parse_quote!(HashMap<u32, String>)));
        assert!(!is_string_map(&parse_quote!(Vec<String>)));
        assert!(!is_string_map(&parse_quote!(String)));
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("OrderClient"), "order_client");
        assert_eq!(snake_case("HTTPClient"), "httpclient");
        assert_eq!(snake_case("V2Orders"), "v2_orders");
        assert_eq!(snake_case("orders"), "orders");
    }
}
