use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

mod entity;

use entity::{EntityField, Shape};

/// Derive macro for the `Entity` trait.
///
/// Generates `get()`, `attributes()` and `primary_keys()` for a struct with
/// named fields. Plain fields are exposed as serialized values, so they must
/// implement `serde::Serialize`.
///
/// # Example
///
/// ```ignore
/// use linkage_core::Entity;
///
/// #[derive(Entity)]
/// struct Car {
///     #[entity(primary_key)]
///     id: u32,
///     model: String,
///     #[entity(relation)]
///     owner: Option<Person>,
///     #[entity(relation)]
///     wheels: Vec<Wheel>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[entity(primary_key)]` - Declare the field as (part of) the primary key
/// - `#[entity(relation)]` - Expose the field as a related entity or collection.
///   Supported shapes are `T`, `Box<T>`, `Option<T>`, `Option<Box<T>>`,
///   `Vec<T>` and `Option<Vec<T>>`
/// - `#[entity(skip)]` - Hide the field entirely
/// - `#[entity(rename = "name")]` - Expose the field under a different key
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_entity_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_entity_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = entity::collect_fields(input)?;

    let getters = fields.iter().map(generate_getter);
    let plain_keys = fields
        .iter()
        .filter(|f| f.shape.is_none())
        .map(|f| &f.key);
    let primary_keys = fields.iter().filter(|f| f.primary_key).map(|f| &f.key);

    Ok(quote! {
        impl #impl_generics ::linkage_core::Entity for #name #ty_generics #where_clause {
            fn get(&self, key: &str) -> ::std::option::Option<::linkage_core::Property<'_>> {
                match key {
                    #(#getters)*
                    _ => ::std::option::Option::None,
                }
            }

            fn attributes(&self) -> ::linkage_core::Attributes {
                let mut attributes = ::linkage_core::Attributes::new();
                for key in [#(#plain_keys),*] {
                    if let ::std::option::Option::Some(::linkage_core::Property::Value(value)) = ::linkage_core::Entity::get(self, key) {
                        attributes.insert(::std::string::ToString::to_string(key), value);
                    }
                }
                attributes
            }

            fn primary_keys(&self) -> &'static [&'static str] {
                &[#(#primary_keys),*]
            }
        }
    })
}

fn generate_getter(field: &EntityField) -> proc_macro2::TokenStream {
    let key = &field.key;
    let ident = &field.ident;
    let property = quote! { ::linkage_core::Property };

    let value = match field.shape {
        None => quote! { ::std::option::Option::Some(#property::value(&self.#ident)) },
        Some(Shape::One) => quote! { ::std::option::Option::Some(#property::one(&self.#ident)) },
        Some(Shape::Boxed) => quote! { ::std::option::Option::Some(#property::one(&*self.#ident)) },
        Some(Shape::Many) => quote! { ::std::option::Option::Some(#property::many(&self.#ident)) },
        Some(Shape::OptionalOne) => quote! { self.#ident.as_ref().map(#property::one) },
        Some(Shape::OptionalBoxed) => quote! { self.#ident.as_deref().map(#property::one) },
        Some(Shape::OptionalMany) => quote! { self.#ident.as_ref().map(#property::many) },
    };

    quote! { #key => #value, }
}
