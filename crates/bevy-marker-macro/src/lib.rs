use std::collections::HashMap;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{braced, Attribute, Error, Expr, Ident, LitInt, Meta, Path, Result, Token, Visibility};

use proc_macro_crate::{crate_name, FoundCrate};

/// One `Name = id;` entry.
struct MarkerEntry {
    name: Ident,
    id: u32,
    id_lit: LitInt,
    /// `#[data = expr]` — initial payload
    data: Option<Expr>,
    /// Doc comments, forwarded onto the generated constant
    docs: Vec<Attribute>,
}

struct HolderInput {
    vis: Visibility,
    root: Ident,
    kind: Path,
    markers: Vec<MarkerEntry>,
}

impl Parse for HolderInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let vis: Visibility = input.parse()?;
        input.parse::<Token![mod]>()?;
        let root: Ident = input.parse()?;
        input.parse::<Token![:]>()?;
        let kind: Path = input.parse()?;
        let content;
        braced!(content in input);

        let mut markers = Vec::new();
        while !content.is_empty() {
            markers.push(parse_marker(&content)?);
        }
        Ok(Self {
            vis,
            root,
            kind,
            markers,
        })
    }
}

fn parse_marker(input: ParseStream) -> Result<MarkerEntry> {
    let attrs = input.call(Attribute::parse_outer)?;
    let mut data = None;
    let mut docs = Vec::new();

    for attr in attrs {
        if attr.path().is_ident("doc") {
            docs.push(attr);
        } else if attr.path().is_ident("data") {
            let nv = match attr.meta {
                Meta::NameValue(nv) => nv,
                other => return Err(Error::new_spanned(other, "expected `#[data = <expr>]`")),
            };
            if data.is_some() {
                return Err(Error::new_spanned(nv, "`data` given more than once"));
            }
            data = Some(nv.value);
        } else {
            return Err(Error::new_spanned(attr, "unsupported attribute; expected `data` or a doc comment"));
        }
    }

    let name: Ident = input.parse()?;
    input.parse::<Token![=]>()?;
    let id_lit: LitInt = input.parse()?;
    input.parse::<Token![;]>()?;

    let id = id_lit.base10_parse::<u32>()?;
    Ok(MarkerEntry {
        name,
        id,
        id_lit,
        data,
        docs,
    })
}

// =============================================================================
// Validation (runs at macro expansion time)
// =============================================================================

/// Reject id 0, duplicate ids and duplicate names.
///
/// Every problem is reported, not just the first.
fn validate(input: &HolderInput) -> Result<()> {
    let mut errors: Option<Error> = None;
    let mut push = |err: Error| match errors.as_mut() {
        Some(all) => all.combine(err),
        None => errors = Some(err),
    };

    let mut ids: HashMap<u32, &Ident> = HashMap::new();
    let mut names: HashMap<String, u32> = HashMap::new();

    for marker in &input.markers {
        if marker.id == 0 {
            push(Error::new(marker.id_lit.span(), format!("marker `{}` uses reserved id 0", marker.name)));
        } else if let Some(first) = ids.insert(marker.id, &marker.name) {
            push(Error::new(
                marker.id_lit.span(),
                format!("id {} used by both `{}` and `{}`", marker.id, first, marker.name),
            ));
        }
        if names.insert(marker.name.to_string(), marker.id).is_some() {
            push(Error::new(marker.name.span(), format!("duplicate marker name `{}`", marker.name)));
        }
    }

    match errors {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// =============================================================================
// Crate path resolution
// =============================================================================

fn marker_crate_path() -> TokenStream2 {
    match crate_name("bevy-marker") {
        Ok(FoundCrate::Itself) => quote!(::bevy_marker),
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Err(_) => quote!(::bevy_marker),
    }
}

/// `Flag` and `Tag` resolve inside the marker crate; any other path is used as written.
fn kind_path(kind: &Path, krate: &TokenStream2) -> TokenStream2 {
    match kind.get_ident() {
        Some(ident) if ident == "Flag" || ident == "Tag" => quote!(#krate::#ident),
        _ => quote!(#kind),
    }
}

// =============================================================================
// Code generation
// =============================================================================

/// Expand a validated input.
///
/// ```ignore
/// holder! {
///     pub mod World: Flag {
///         DoorOpen = 1;
///         #[data = true]
///         Started = 2;
///     }
/// }
///
/// // Generates:
/// #[allow(non_snake_case, non_upper_case_globals)]
/// pub mod World {
///     pub const NAME: &str = "World";
///     pub const MARKER_COUNT: usize = 2;
///     pub const DEFINITIONS: &[MarkerDef<Flag>] = &[
///         MarkerDef { id: 1, name: "DoorOpen", data: None },
///         MarkerDef { id: 2, name: "Started", data: Some(true) },
///     ];
///     pub const DoorOpen: MarkerId = 1;
///     pub const Started: MarkerId = 2;
///     pub fn holder() -> Result<Holder<Flag>> { ... }
/// }
/// ```
fn expand(input: &HolderInput, krate: &TokenStream2) -> TokenStream2 {
    let vis = &input.vis;
    let root = &input.root;
    let kind = kind_path(&input.kind, krate);
    let holder_name = syn::LitStr::new(&root.to_string(), root.span());
    let count = input.markers.len();

    let defs = input.markers.iter().map(|marker| {
        let id = &marker.id_lit;
        let name = syn::LitStr::new(&marker.name.to_string(), marker.name.span());
        let data = match &marker.data {
            Some(expr) => quote!(::core::option::Option::Some(#expr)),
            None => quote!(::core::option::Option::None),
        };
        quote! {
            #krate::MarkerDef::<#kind> {
                id: #id,
                name: #name,
                data: #data,
            },
        }
    });

    let consts = input.markers.iter().map(|marker| {
        let name = &marker.name;
        let id = &marker.id_lit;
        let docs = &marker.docs;
        quote! {
            #(#docs)*
            pub const #name: #krate::MarkerId = #id;
        }
    });

    quote! {
        #[allow(non_snake_case, non_upper_case_globals)]
        #vis mod #root {
            #[allow(unused_imports)]
            use super::*;

            /// Holder name.
            pub const NAME: &str = #holder_name;

            /// Number of markers declared in this holder.
            pub const MARKER_COUNT: usize = #count;

            /// Static marker table (for `Holder::from_defs`).
            pub const DEFINITIONS: &[#krate::MarkerDef<#kind>] = &[
                #(#defs)*
            ];

            #(#consts)*

            /// Build a runtime holder from [`DEFINITIONS`].
            pub fn holder() -> #krate::Result<#krate::Holder<#kind>> {
                #krate::Holder::from_defs(NAME, DEFINITIONS)
            }
        }
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Declare a static holder with stable marker ids.
///
/// Ids are written by hand so they survive renames; `0` is reserved and
/// duplicates are rejected at compile time.
#[proc_macro]
pub fn holder(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as HolderInput);
    if let Err(err) = validate(&input) {
        return err.to_compile_error().into();
    }
    expand(&input, &marker_crate_path()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(tokens: TokenStream2) -> HolderInput {
        syn::parse2(tokens).expect("input should parse")
    }

    #[test]
    fn parses_markers_and_data() {
        let input = parse(quote! {
            pub mod World: Flag {
                /// The front door.
                DoorOpen = 1;
                #[data = true]
                Started = 2;
            }
        });

        assert_eq!(input.root, "World");
        assert_eq!(input.markers.len(), 2);
        assert_eq!(input.markers[0].docs.len(), 1);
        assert!(input.markers[0].data.is_none());
        assert_eq!(input.markers[1].id, 2);
        assert!(input.markers[1].data.is_some());
        assert!(validate(&input).is_ok());
    }

    #[test]
    fn rejects_unknown_attribute() {
        let result = syn::parse2::<HolderInput>(quote! {
            mod World: Flag {
                #[color = 3]
                DoorOpen = 1;
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_and_duplicate_ids() {
        let input = parse(quote! {
            mod Units: Tag {
                Enemy = 0;
                Ally = 4;
                Neutral = 4;
                Ally = 5;
            }
        });

        let err = validate(&input).unwrap_err();
        let messages: Vec<String> = err.into_iter().map(|e| e.to_string()).collect();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("reserved id 0"));
        assert!(messages[1].contains("id 4 used by both `Ally` and `Neutral`"));
        assert!(messages[2].contains("duplicate marker name `Ally`"));
    }

    #[test]
    fn expands_kind_into_crate_path() {
        let input = parse(quote! {
            pub mod Units: Tag {
                #[data = Rgba::RED]
                Enemy = 7;
            }
        });
        let krate = quote!(::bevy_marker);
        let code = expand(&input, &krate).to_string();

        assert!(code.contains("pub mod Units"));
        assert!(code.contains("MarkerDef < :: bevy_marker :: Tag >"));
        assert!(code.contains("pub const Enemy : :: bevy_marker :: MarkerId = 7"));
        assert!(code.contains("Some (Rgba :: RED)"));
        assert!(code.contains("\"Units\""));
    }

    #[test]
    fn custom_kind_path_is_kept() {
        let input = parse(quote! {
            mod Cues: my_game::Cue {
                Spawn = 1;
            }
        });
        let code = expand(&input, &quote!(::bevy_marker)).to_string();
        assert!(code.contains("MarkerDef < my_game :: Cue >"));
    }
}
