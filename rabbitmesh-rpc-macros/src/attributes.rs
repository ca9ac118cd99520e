use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::parse::ParseStream;
use syn::{Attribute, Ident, LitStr, Meta, Token};

pub const SENDER_ATTRIBUTE: &str = "rabbit_sender";
const ROLE_ATTRIBUTES: &[&str] = &["payload", "header", "headers"];

/// Addressing keys of `#[rabbit_client(...)]` and `#[rabbit_sender(...)]`
#[derive(Debug, Default)]
pub struct SenderArgs {
    pub exchange: Option<LitStr>,
    pub exchange_generator: Option<LitStr>,
    pub routing_key: Option<LitStr>,
    pub routing_key_generator: Option<LitStr>,
    pub message_post_processor: Option<LitStr>,
}

impl SenderArgs {
    /// Parse one `key = "value"` pair; `false` when the key is not an addressing key
    pub fn parse_key(&mut self, meta: &ParseNestedMeta) -> syn::Result<bool> {
        let slot = if meta.path.is_ident("exchange") {
            &mut self.exchange
        } else if meta.path.is_ident("exchange_generator") {
            &mut self.exchange_generator
        } else if meta.path.is_ident("routing_key") {
            &mut self.routing_key
        } else if meta.path.is_ident("routing_key_generator") {
            &mut self.routing_key_generator
        } else if meta.path.is_ident("message_post_processor") {
            &mut self.message_post_processor
        } else {
            return Ok(false);
        };

        if slot.is_some() {
            return Err(meta.error("duplicate key"));
        }
        *slot = Some(meta.value()?.parse()?);
        Ok(true)
    }

    /// `SenderAttributes` builder expression
    pub fn to_builder(&self) -> TokenStream2 {
        let setters = [
            (quote!(with_exchange), &self.exchange),
            (quote!(with_exchange_generator), &self.exchange_generator),
            (quote!(with_routing_key), &self.routing_key),
            (quote!(with_routing_key_generator), &self.routing_key_generator),
            (quote!(with_message_post_processor), &self.message_post_processor),
        ]
        .into_iter()
        .filter_map(|(setter, value)| value.as_ref().map(|value| quote!(.#setter(#value))));

        quote! {
            ::rabbitmesh_rpc::SenderAttributes::new() #(#setters)*
        }
    }
}

/// Arguments of the `#[rabbit_client(...)]` attribute itself
#[derive(Debug, Default)]
pub struct ClientArgs {
    pub sender: SenderArgs,
    pub name: Option<LitStr>,
}

impl ClientArgs {
    pub fn parse_meta(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if self.sender.parse_key(&meta)? {
            return Ok(());
        }
        if meta.path.is_ident("name") {
            if self.name.is_some() {
                return Err(meta.error("duplicate key"));
            }
            self.name = Some(meta.value()?.parse()?);
            return Ok(());
        }
        Err(meta.error(
            "expected one of: exchange, routing_key, exchange_generator, routing_key_generator, message_post_processor, name",
        ))
    }
}

/// Method-level overrides from `#[rabbit_sender(...)]`
pub fn method_sender(attrs: &[Attribute]) -> syn::Result<Option<SenderArgs>> {
    let mut sender = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident(SENDER_ATTRIBUTE)) {
        if sender.is_some() {
            return Err(syn::Error::new_spanned(attr, "duplicate #[rabbit_sender] attribute"));
        }
        let mut args = SenderArgs::default();
        if !matches!(attr.meta, Meta::Path(_)) {
            attr.parse_nested_meta(|meta| {
                if args.parse_key(&meta)? {
                    Ok(())
                } else {
                    Err(meta.error(
                        "expected one of: exchange, routing_key, exchange_generator, routing_key_generator, message_post_processor",
                    ))
                }
            })?;
        }
        sender = Some(args);
    }
    Ok(sender)
}

/// Role of a parameter as declared by its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Payload,
    Header(Option<String>),
    HeaderMap,
}

impl Role {
    pub fn to_builder(&self) -> TokenStream2 {
        match self {
            Self::Payload => quote!(.payload()),
            Self::Header(None) => quote!(.header()),
            Self::Header(Some(name)) => quote!(.named_header(#name)),
            Self::HeaderMap => quote!(.headers()),
        }
    }
}

/// Parameter role; at most one role attribute is allowed
pub fn param_role(attrs: &[Attribute]) -> syn::Result<Option<Role>> {
    let mut role = None;
    for attr in attrs.iter().filter(|attr| is_role_attribute(attr)) {
        if role.is_some() {
            return Err(syn::Error::new_spanned(
                attr,
                "a parameter takes at most one of #[payload], #[header], #[headers]",
            ));
        }
        role = Some(parse_role(attr)?);
    }
    Ok(role)
}

fn parse_role(attr: &Attribute) -> syn::Result<Role> {
    if attr.path().is_ident("header") {
        return match &attr.meta {
            Meta::Path(_) => Ok(Role::Header(None)),
            _ => attr.parse_args_with(header_name).map(|name| Role::Header(Some(name))),
        };
    }

    attr.meta.require_path_only()?;
    if attr.path().is_ident("payload") {
        Ok(Role::Payload)
    } else {
        Ok(Role::HeaderMap)
    }
}

/// `"name"` or `name = "name"`
fn header_name(input: ParseStream) -> syn::Result<String> {
    if input.peek(LitStr) {
        return Ok(input.parse::<LitStr>()?.value());
    }
    let key: Ident = input.parse()?;
    if key != "name" {
        return Err(syn::Error::new(key.span(), "expected `name = \"...\"`"));
    }
    input.parse::<Token![=]>()?;
    Ok(input.parse::<LitStr>()?.value())
}

pub fn is_role_attribute(attr: &Attribute) -> bool {
    ROLE_ATTRIBUTES.iter().any(|name| attr.path().is_ident(name))
}
