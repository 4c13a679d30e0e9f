use darling::FromMeta;
use proc_macro::TokenStream;
use proc_macro_crate::*;
use quote::{format_ident, quote};
use syn::{parse_macro_input, AttributeArgs, ItemFn};

#[derive(Debug, FromMeta)]
struct PluginArgs {
    name: String,
    #[darling(default)]
    version: Option<String>,
    #[darling(default)]
    description: Option<String>,
    #[darling(default)]
    help_fn: Option<String>,
    #[darling(default)]
    target_list_fn: Option<String>,
    #[darling(default)]
    accept_input: Option<bool>,
}

/// Kind specific parts of the generated code.
struct PluginKind {
    export_prefix: &'static str,
    descriptor: proc_macro2::TokenStream,
    input: proc_macro2::TokenStream,
    instance: proc_macro2::TokenStream,
    create: proc_macro2::TokenStream,
    accept_input: bool,
}

fn validate_plugin_name(name: &str) {
    if name.is_empty() || !name.chars().all(char::is_alphanumeric) {
        panic!("plugin name must only contain alphanumeric characters");
    }
}

fn parse_fn_name(name: Option<String>) -> Option<proc_macro2::TokenStream> {
    name.map(|n| {
        n.parse()
            .unwrap_or_else(|_| panic!("invalid function name: {}", n))
    })
}

/// Expands a plugin attribute into the descriptor static, the create shim and the callbacks.
fn plugin_gen(args: PluginArgs, kind: PluginKind, func: ItemFn) -> TokenStream {
    let crate_path = crate_path();

    let plugin_name = args.name;
    validate_plugin_name(&plugin_name);

    let version_gen = args
        .version
        .map_or_else(|| quote! { env!("CARGO_PKG_VERSION") }, |v| quote! { #v });

    let description_gen = args.description.map_or_else(
        || quote! { env!("CARGO_PKG_DESCRIPTION") },
        |d| quote! { #d },
    );

    let help_fn = parse_fn_name(args.help_fn);
    let target_list_fn = parse_fn_name(args.target_list_fn);

    let help_gen = if help_fn.is_some() {
        quote! { Some(cf_help_callback) }
    } else {
        quote! { None }
    };

    let target_list_gen = if target_list_fn.is_some() {
        quote! { Some(cf_target_list_callback) }
    } else {
        quote! { None }
    };

    let accept_input = args.accept_input.unwrap_or(kind.accept_input);

    let descriptor_name = format_ident!("{}{}", kind.export_prefix, plugin_name.to_uppercase());

    let func_name = &func.sig.ident;

    let call_gen = if accept_input {
        quote! { |args, input| #func_name(args, input) }
    } else {
        quote! { |args, _| #func_name(args) }
    };

    let PluginKind {
        descriptor,
        input,
        instance,
        create,
        ..
    } = kind;

    let create_fn_gen = quote! {
        #[doc(hidden)]
        extern "C" fn cf_create(
            args: #crate_path::abi::CSliceRef<u8>,
            input: &mut #crate_path::abi::COption<#crate_path::plugins::#input>,
            lib: #crate_path::plugins::LibArc,
            logger: Option<&'static #crate_path::plugins::PluginLogger>,
            out: &mut ::core::mem::MaybeUninit<#crate_path::plugins::#instance>,
        ) -> i32 {
            #crate_path::plugins::#create(args, input, lib, logger, out, #call_gen)
        }
    };

    let help_fn_gen = help_fn.map_or_else(proc_macro2::TokenStream::new, |help_fn| {
        quote! {
            #[doc(hidden)]
            extern "C" fn cf_help_callback(
                mut callback: #crate_path::plugins::HelpCallback,
            ) {
                let helpstr: ::std::string::String = #help_fn();
                let _ = callback.call(helpstr.into());
            }
        }
    });

    let target_list_fn_gen =
        target_list_fn.map_or_else(proc_macro2::TokenStream::new, |target_list_fn| {
            quote! {
                #[doc(hidden)]
                extern "C" fn cf_target_list_callback(
                    callback: #crate_path::plugins::TargetCallback,
                ) -> i32 {
                    #crate_path::error::AsIntResult::into_int_result(
                        #target_list_fn().map(|targets| {
                            #crate_path::abi::FeedCallback::feed_into(targets, callback);
                        })
                    )
                }
            }
        });

    let gen = quote! {
        #[doc(hidden)]
        #[no_mangle]
        pub static #descriptor_name: #crate_path::plugins::#descriptor =
            #crate_path::plugins::#descriptor {
                plugin_version: #crate_path::plugins::CAPFLOW_PLUGIN_VERSION,
                input_layout: <#crate_path::abi::COption<#crate_path::plugins::#input>
                    as #crate_path::abi_stable::StableAbi>::LAYOUT,
                output_layout: <#crate_path::plugins::#instance
                    as #crate_path::abi_stable::StableAbi>::LAYOUT,
                accept_input: #accept_input,
                name: #crate_path::abi::CSliceRef::from_str(#plugin_name),
                version: #crate_path::abi::CSliceRef::from_str(#version_gen),
                description: #crate_path::abi::CSliceRef::from_str(#description_gen),
                help_callback: #help_gen,
                target_list_callback: #target_list_gen,
                create: cf_create,
            };

        #create_fn_gen

        #help_fn_gen

        #target_list_fn_gen

        #func
    };

    gen.into()
}

/// Exports a connector plugin.
///
/// The annotated function creates the connector from its arguments:
/// `fn(&ConnectorArgs) -> Result<T>`, or `fn(&ConnectorArgs, &mut Option<OsInstance>) -> Result<T>`
/// when `accept_input = true`. `T` has to implement `ConnectorGroup`.
///
/// Optional parameters are `version` and `description` (taken from the crate manifest by
/// default), `help_fn` naming a `fn() -> String`, `target_list_fn` naming a
/// `fn() -> Result<Vec<TargetInfo>>` and `accept_input`.
///
/// The generated descriptor static is named `CAPFLOW_CONNECTOR_` followed by the upper case
/// plugin name.
// Every crate using the macro exports the descriptor again, which leads to duplicated symbols
// when several connectors are linked into one binary. See
// https://github.com/rust-lang/rust/issues/20267 for the tracking issue.
#[proc_macro_attribute]
pub fn connector(args: TokenStream, input: TokenStream) -> TokenStream {
    let attr_args = parse_macro_input!(args as AttributeArgs);
    let args = match PluginArgs::from_list(&attr_args) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.write_errors()),
    };

    let func = parse_macro_input!(input as ItemFn);

    plugin_gen(
        args,
        PluginKind {
            export_prefix: "CAPFLOW_CONNECTOR_",
            descriptor: quote! { ConnectorDescriptor },
            input: quote! { OsInstance },
            instance: quote! { ConnectorInstance },
            create: quote! { create_connector },
            accept_input: false,
        },
        func,
    )
}

/// Exports an OS layer plugin.
///
/// The annotated function has the signature
/// `fn(&OsArgs, &mut Option<ConnectorInstance>) -> Result<T>` where `T` implements `OsGroup`.
/// A connector left in the option is handed back to the caller. With `accept_input = false` the
/// function only takes the arguments.
///
/// Takes the same optional parameters as [`macro@connector`]. The descriptor static is named
/// `CAPFLOW_OS_` followed by the upper case plugin name.
#[proc_macro_attribute]
pub fn os_layer(args: TokenStream, input: TokenStream) -> TokenStream {
    let attr_args = parse_macro_input!(args as AttributeArgs);
    let args = match PluginArgs::from_list(&attr_args) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.write_errors()),
    };

    let func = parse_macro_input!(input as ItemFn);

    plugin_gen(
        args,
        PluginKind {
            export_prefix: "CAPFLOW_OS_",
            descriptor: quote! { OsDescriptor },
            input: quote! { ConnectorInstance },
            instance: quote! { OsInstance },
            create: quote! { create_os },
            accept_input: true,
        },
        func,
    )
}

/// Auto derive the `Pod` trait for structs.
///
/// The type has to be `repr(C)` or `repr(transparent)`, every field has to implement `Pod` and
/// there must be no padding between the fields. Generic structs are not supported.
///
/// The dataview derive looks for `::dataview::derive_pod!`, this one forwards to the copy
/// re-exported by capflow so plugins do not need a direct dependency.
#[proc_macro_derive(Pod)]
pub fn pod_derive(input: TokenStream) -> TokenStream {
    let crate_path = crate_path();

    format!("{}::dataview::derive_pod!{{ {} }}", crate_path, input)
        .parse()
        .unwrap_or_else(|_| panic!("unable to expand Pod derive"))
}

fn crate_path() -> proc_macro2::TokenStream {
    let (col, ident) = crate_path_ident();
    quote!(#col #ident)
}

fn crate_path_ident() -> (Option<syn::token::Colon2>, proc_macro2::Ident) {
    match crate_path_fixed() {
        FoundCrate::Itself => (None, format_ident!("crate")),
        FoundCrate::Name(name) => (Some(Default::default()), format_ident!("{}", name)),
    }
}

fn crate_path_fixed() -> FoundCrate {
    let found_crate = crate_name("capflow").unwrap_or_else(|_| FoundCrate::Name("capflow".into()));

    match found_crate {
        FoundCrate::Itself => {
            // doc tests of capflow link against it as an external crate
            let has_doc_env = std::env::vars().any(|(k, _)| {
                k == "UNSTABLE_RUSTDOC_TEST_LINE" || k == "UNSTABLE_RUSTDOC_TEST_PATH"
            });

            if has_doc_env {
                FoundCrate::Name("capflow".to_string())
            } else {
                FoundCrate::Itself
            }
        }
        x => x,
    }
}
