use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{FnArg, Ident, ItemTrait, LitStr, Pat, TraitItem, TraitItemFn, Type};

use crate::attributes::{is_role_attribute, method_sender, param_role, ClientArgs, Role, SenderArgs, SENDER_ATTRIBUTE};
use crate::signature::{is_string_map, is_unit, result_value_type, snake_case, type_name};

struct ClientParam {
    ident: Ident,
    type_name: String,
    string_map: bool,
    role: Option<Role>,
}

struct ClientMethod {
    sig: syn::Signature,
    params: Vec<ClientParam>,
    /// `None` for fire-and-forget methods
    reply_type: Option<Type>,
    return_type_name: String,
    sender: Option<SenderArgs>,
}

impl ClientMethod {
    fn signature_literal(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(|p| p.type_name.as_str()).collect();
        format!("{}::{}::{}", self.return_type_name, self.sig.ident, params.join("::"))
    }
}

/// Expand `#[rabbit_client]` on a trait
pub fn expand(args: ClientArgs, mut item: ItemTrait) -> syn::Result<TokenStream2> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&item.generics, "client traits cannot be generic"));
    }

    let mut methods = Vec::new();
    for trait_item in &mut item.items {
        match trait_item {
            TraitItem::Fn(method) => {
                methods.push(parse_method(method)?);
                strip_attributes(method);
            }
            other => {
                return Err(syn::Error::new_spanned(other, "client traits may only contain methods"));
            }
        }
    }

    let trait_ident = &item.ident;
    let vis = &item.vis;
    let struct_ident = format_ident!("Rabbit{}", trait_ident);
    let interface_name = trait_ident.to_string();
    let qualifier = args
        .name
        .unwrap_or_else(|| LitStr::new(&snake_case(&interface_name), trait_ident.span()));
    let struct_doc = format!("RabbitMQ client implementing [`{}`]", interface_name);

    let defaults = args.sender.to_builder();
    let method_decls = methods.iter().map(method_declaration);
    let method_impls = methods.iter().map(method_implementation);

    Ok(quote! {
        #[::rabbitmesh_rpc::async_trait]
        #item

        #[doc = #struct_doc]
        #[derive(Clone, Debug)]
        #vis struct #struct_ident {
            client: ::rabbitmesh_rpc::GeneratedClient,
        }

        impl ::rabbitmesh_rpc::RabbitClientDefinition for #struct_ident {
            fn qualifier() -> &'static str {
                #qualifier
            }

            fn declaration() -> ::rabbitmesh_rpc::InterfaceDecl {
                ::rabbitmesh_rpc::InterfaceDecl::new(#interface_name)
                    .with_defaults(#defaults)
                    #(.with_method(#method_decls))*
            }

            fn from_client(client: ::rabbitmesh_rpc::GeneratedClient) -> Self {
                Self { client }
            }

            fn client(&self) -> &::rabbitmesh_rpc::GeneratedClient {
                &self.client
            }
        }

        #[::rabbitmesh_rpc::async_trait]
        impl #trait_ident for #struct_ident {
            #(#method_impls)*
        }

        ::rabbitmesh_rpc::inventory::submit! {
            ::rabbitmesh_rpc::ClientDescriptor::new(
                #qualifier,
                <#struct_ident as ::rabbitmesh_rpc::RabbitClientDefinition>::declaration,
            )
        }
    })
}

fn parse_method(method: &TraitItemFn) -> syn::Result<ClientMethod> {
    let sig = &method.sig;

    if method.default.is_some() {
        return Err(syn::Error::new_spanned(sig, "client methods cannot have a body"));
    }
    if sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(sig.fn_token, "client methods must be `async fn`"));
    }
    if sig.generics.type_params().next().is_some() || sig.generics.const_params().next().is_some() {
        return Err(syn::Error::new_spanned(&sig.generics, "client methods cannot be generic"));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => return Err(syn::Error::new(sig.ident.span(), "client methods must take `&self`")),
    }

    let mut params = Vec::new();
    for input in inputs {
        let FnArg::Typed(pat_type) = input else {
            return Err(syn::Error::new_spanned(input, "unexpected receiver"));
        };
        let Pat::Ident(pat_ident) = &*pat_type.pat else {
            return Err(syn::Error::new_spanned(&pat_type.pat, "client parameters must be plain identifiers"));
        };
        params.push(ClientParam {
            ident: pat_ident.ident.clone(),
            type_name: type_name(&pat_type.ty),
            string_map: is_string_map(&pat_type.ty),
            role: param_role(&pat_type.attrs)?,
        });
    }

    let value_type = result_value_type(&sig.output)
        .ok_or_else(|| syn::Error::new(sig.output.span(), "client methods must return `Result<T>` or `Result<T, E>`"))?;
    let (reply_type, return_type_name) = if is_unit(value_type) {
        (None, "()".to_string())
    } else {
        (Some(value_type.clone()), type_name(value_type))
    };

    Ok(ClientMethod {
        sig: sig.clone(),
        params,
        reply_type,
        return_type_name,
        sender: method_sender(&method.attrs)?,
    })
}

/// Remove the attributes this macro consumes
fn strip_attributes(method: &mut TraitItemFn) {
    method.attrs.retain(|attr| !attr.path().is_ident(SENDER_ATTRIBUTE));
    for input in &mut method.sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            pat_type.attrs.retain(|attr| !is_role_attribute(attr));
        }
    }
}

fn method_declaration(method: &ClientMethod) -> TokenStream2 {
    let name = method.sig.ident.to_string();
    let params = method.params.iter().map(|param| {
        let param_name = param.ident.to_string();
        let param_type = &param.type_name;
        let shape = param
            .string_map
            .then(|| quote!(.with_shape(::rabbitmesh_rpc::ParamShape::StringMap)));
        let role = param.role.as_ref().map(Role::to_builder);
        quote! {
            ::rabbitmesh_rpc::ParamDecl::new(#param_name, #param_type) #shape #role
        }
    });
    let returns = match &method.reply_type {
        Some(_) => {
            let type_name = &method.return_type_name;
            quote!(.returns(::rabbitmesh_rpc::ReturnType::value(#type_name)))
        }
        None => quote!(),
    };
    let sender = method.sender.as_ref().map(|sender| {
        let builder = sender.to_builder();
        quote!(.with_sender(#builder))
    });

    quote! {
        ::rabbitmesh_rpc::MethodDecl::new(#name)
            #(.with_param(#params))*
            #returns
            #sender
    }
}

fn method_implementation(method: &ClientMethod) -> TokenStream2 {
    let mut sig = method.sig.clone();
    for input in &mut sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            pat_type.attrs.clear();
        }
    }

    let signature = method.signature_literal();
    let args = method.params.iter().map(|param| &param.ident);
    let call = match &method.reply_type {
        Some(reply_type) => quote!(self.client.request::<#reply_type>(&METHOD, args).await),
        None => quote!(self.client.send(&METHOD, args).await),
    };

    quote! {
        #sig {
            const METHOD: ::rabbitmesh_rpc::MethodId = ::rabbitmesh_rpc::MethodId::from_static(#signature);
            let args = ::std::vec![#(::rabbitmesh_rpc::to_argument(&#args)?),*];
            #call.map_err(::core::convert::Into::into)
        }
    }
}
