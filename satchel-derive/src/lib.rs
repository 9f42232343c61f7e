//! # Satchel Derive Macros
//!
//! `#[derive(Persist)]` writes the `Persist` impl of a struct from per-field markers, so
//! the transformer never has to discover fields at runtime.
//!
//! Container attributes (`#[persist(...)]` on the struct):
//!
//! * `file = "name"`: top-level entity saved to `name`. Requires exactly one `id` field.
//! * `explicit`: with `file`, only saved and loaded on explicit request.
//! * `nested`: also implement `Field`, so the type can sit in another entity's field.
//! * `save_hook` / `load_hook`: delegate to the type's `SaveHook` / `LoadHook` impl.
//!
//! Field attributes:
//!
//! * `#[persist]`: saved through the mapper layer.
//! * `#[persist(raw)]`: saved as a plain value, never substituted.
//! * `#[persist(id)]`: the identity. Must be a `String`; becomes the record id.
//! * `#[persist(rename = "key")]`: stored under `key` instead of the field name.
//!
//! Unmarked fields are not saved.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use std::collections::HashSet;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, LitStr};

/// Derives `satchel::Persist` (and `satchel::schema::Field` for `#[persist(nested)]`).
#[proc_macro_derive(Persist, attributes(persist))]
pub fn derive_persist(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

// --- Parsed attributes ---

#[derive(Default)]
struct Container {
    file: Option<LitStr>,
    explicit: bool,
    nested: bool,
    save_hook: bool,
    load_hook: bool,
}

#[derive(PartialEq)]
enum Mode {
    Mapped,
    Raw,
    Id,
}

struct SavedField {
    ident: syn::Ident,
    key: String,
    mode: Mode,
}

fn parse_container(attrs: &[Attribute]) -> syn::Result<Container> {
    let mut container = Container::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("persist")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("file") {
                container.file = Some(meta.value()?.parse()?);
                return Ok(());
            }
            if meta.path.is_ident("explicit") {
                container.explicit = true;
                return Ok(());
            }
            if meta.path.is_ident("nested") {
                container.nested = true;
                return Ok(());
            }
            if meta.path.is_ident("save_hook") {
                container.save_hook = true;
                return Ok(());
            }
            if meta.path.is_ident("load_hook") {
                container.load_hook = true;
                return Ok(());
            }
            Err(meta.error(
                "unknown persist container key. Supported: file, explicit, nested, save_hook, load_hook",
            ))
        })?;
    }
    Ok(container)
}

/// Returns `None` for unmarked fields.
fn parse_field(field: &syn::Field) -> syn::Result<Option<SavedField>> {
    let Some(ident) = field.ident.clone() else {
        return Ok(None);
    };
    let mut marked = false;
    let mut raw = false;
    let mut id = false;
    let mut rename: Option<LitStr> = None;

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("persist")) {
        marked = true;
        // A bare `#[persist]` carries no list.
        if matches!(attr.meta, syn::Meta::Path(_)) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("raw") {
                raw = true;
                return Ok(());
            }
            if meta.path.is_ident("id") {
                id = true;
                return Ok(());
            }
            if meta.path.is_ident("rename") {
                rename = Some(meta.value()?.parse()?);
                return Ok(());
            }
            Err(meta.error("unknown persist field key. Supported: raw, id, rename"))
        })?;
    }

    if !marked {
        return Ok(None);
    }
    if id && (raw || rename.is_some()) {
        return Err(syn::Error::new_spanned(
            &ident,
            "an id field is the record id and takes no other persist key",
        ));
    }
    let mode = if id {
        Mode::Id
    } else if raw {
        Mode::Raw
    } else {
        Mode::Mapped
    };
    let key = rename.map_or_else(|| ident.to_string(), |lit| lit.value());
    Ok(Some(SavedField { ident, key, mode }))
}

// --- Expansion ---

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(ds) => match &ds.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new(
                    name.span(),
                    "Persist needs named fields, their names are the saved keys",
                ));
            }
        },
        _ => return Err(syn::Error::new(name.span(), "Persist only supports structs")),
    };

    // 1. Attributes
    let container = parse_container(&input.attrs)?;
    let mut saved = Vec::new();
    for field in fields {
        if let Some(parsed) = parse_field(field)? {
            saved.push(parsed);
        }
    }

    // 2. Structural checks
    let ids: Vec<&SavedField> = saved.iter().filter(|f| f.mode == Mode::Id).collect();
    if ids.len() > 1 {
        return Err(syn::Error::new_spanned(&ids[1].ident, "only one field can be the persist id"));
    }
    let id_field = ids.first().map(|f| &f.ident);
    if container.file.is_some() && id_field.is_none() {
        return Err(syn::Error::new(
            name.span(),
            "a type saved to a file needs exactly one `#[persist(id)]` String field",
        ));
    }
    if container.explicit && container.file.is_none() {
        return Err(syn::Error::new(name.span(), "`explicit` needs `file = \"...\"`"));
    }
    if let Some(file) = &container.file {
        let value = file.value();
        if value.trim().is_empty() || value.contains(['/', '\\']) {
            return Err(syn::Error::new(file.span(), "file must be a plain, non-empty name"));
        }
    }
    let mut keys = HashSet::new();
    for field in saved.iter().filter(|f| f.mode != Mode::Id) {
        if !keys.insert(field.key.as_str()) {
            return Err(syn::Error::new_spanned(
                &field.ident,
                format!("key `{}` is saved twice", field.key),
            ));
        }
    }

    // 3. Generate
    let persist = generate_persist(input, &container, &saved, id_field);
    let field = if container.nested {
        generate_field(input)
    } else {
        quote! {}
    };

    Ok(quote! {
        #persist
        #field
    })
}

fn generate_persist(
    input: &DeriveInput,
    container: &Container,
    saved: &[SavedField],
    id_field: Option<&syn::Ident>,
) -> proc_macro2::TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let body: Vec<&SavedField> = saved.iter().filter(|f| f.mode != Mode::Id).collect();

    // Unused parameters would warn on types with nothing to save.
    let (out, inp) = if body.is_empty() {
        (syn::Ident::new("_out", Span::call_site()), syn::Ident::new("_input", Span::call_site()))
    } else {
        (syn::Ident::new("out", Span::call_site()), syn::Ident::new("input", Span::call_site()))
    };

    let saves = body.iter().map(|f| {
        let ident = &f.ident;
        let key = &f.key;
        match f.mode {
            Mode::Raw => quote! { #out.raw(#key, &self.#ident)?; },
            _ => quote! { #out.field(#key, &self.#ident)?; },
        }
    });
    let loads = body.iter().map(|f| {
        let ident = &f.ident;
        let key = &f.key;
        match f.mode {
            Mode::Raw => quote! { #inp.raw(#key, &mut self.#ident)?; },
            _ => quote! { #inp.field(#key, &mut self.#ident)?; },
        }
    });

    let identity = id_field.map(|id| {
        quote! {
            fn identity(&self) -> ::core::option::Option<&str> {
                ::core::option::Option::Some(self.#id.as_str())
            }

            fn identity_mut(&mut self) -> ::core::option::Option<&mut ::std::string::String> {
                ::core::option::Option::Some(&mut self.#id)
            }
        }
    });

    let routing = container.file.as_ref().map(|file| {
        let explicit = container.explicit;
        quote! {
            fn saved(&self) -> ::core::option::Option<::satchel::source::Saved> {
                ::core::option::Option::Some(::satchel::source::Saved {
                    file: ::std::string::String::from(#file),
                    explicit: #explicit,
                })
            }
        }
    });

    let save_hook = container.save_hook.then(|| {
        quote! {
            fn on_save(&self, saver: &mut ::satchel::transform::Saver<'_, '_>) -> ::satchel::Result<()> {
                <Self as ::satchel::schema::SaveHook>::on_save(self, saver)
            }
        }
    });
    let load_hook = container.load_hook.then(|| {
        quote! {
            fn on_load(&mut self, loader: &::satchel::transform::Loader<'_>) -> ::satchel::Result<()> {
                <Self as ::satchel::schema::LoadHook>::on_load(self, loader)
            }
        }
    });

    quote! {
        impl #impl_generics ::satchel::schema::Persist for #name #ty_generics #where_clause {
            fn type_name(&self) -> &'static str {
                ::core::any::type_name::<Self>()
            }

            fn save_fields(&self, #out: &mut ::satchel::transform::RecordWriter<'_>) -> ::satchel::Result<()> {
                #(#saves)*
                ::core::result::Result::Ok(())
            }

            fn load_fields(&mut self, #inp: &::satchel::transform::RecordReader<'_>) -> ::satchel::Result<()> {
                #(#loads)*
                ::core::result::Result::Ok(())
            }

            #identity
            #routing
            #save_hook
            #load_hook

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::core::any::Any> {
                self
            }
        }
    }
}

fn generate_field(input: &DeriveInput) -> proc_macro2::TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    quote! {
        impl #impl_generics ::satchel::schema::Field for #name #ty_generics #where_clause {
            fn describe() -> ::satchel::schema::TypeInfo {
                ::satchel::schema::TypeInfo::of::<Self>()
            }

            fn type_info(&self) -> ::satchel::schema::TypeInfo {
                <Self as ::satchel::schema::Field>::describe()
            }

            fn shape(&self) -> ::satchel::schema::Shape<'_> {
                ::satchel::schema::Shape::Nested(self)
            }

            fn shape_mut(&mut self) -> ::satchel::schema::ShapeMut<'_> {
                ::satchel::schema::ShapeMut::Nested(self)
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }
        }
    }
}
