/// How a relation field holds its related entities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Shape {
    One,
    Boxed,
    Many,
    OptionalOne,
    OptionalBoxed,
    OptionalMany,
}

/// A non-skipped field as exposed through `Entity::get`.
pub(crate) struct EntityField {
    pub ident: syn::Ident,
    pub key: String,
    pub primary_key: bool,
    /// `None` for plain value fields.
    pub shape: Option<Shape>,
}

pub(crate) fn collect_fields(input: &syn::DeriveInput) -> syn::Result<Vec<EntityField>> {
    let fields = match &input.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(named),
            ..
        }) => &named.named,
        syn::Data::Struct(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Entity can only be derived for structs with named fields",
            ));
        }
        syn::Data::Enum(_) | syn::Data::Union(_) => {
            return Err(syn::Error::new_spanned(input, "Entity can only be derived for structs"));
        }
    };

    let mut result = Vec::new();
    for field in fields {
        let attrs = parse_field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        if attrs.relation && attrs.primary_key {
            return Err(syn::Error::new_spanned(
                field,
                "a relation cannot be a primary key",
            ));
        }
        let shape = if attrs.relation {
            Some(relation_shape(&field.ty))
        } else {
            None
        };
        let key = attrs.rename.unwrap_or_else(|| ident.to_string());
        result.push(EntityField {
            ident,
            key,
            primary_key: attrs.primary_key,
            shape,
        });
    }
    Ok(result)
}

/// Classifies a relation field by its outer type constructors.
fn relation_shape(ty: &syn::Type) -> Shape {
    match wrapper(ty) {
        Some(("Box", _)) => Shape::Boxed,
        Some(("Vec", _)) => Shape::Many,
        Some(("Option", inner)) => match wrapper(inner) {
            Some(("Box", _)) => Shape::OptionalBoxed,
            Some(("Vec", _)) => Shape::OptionalMany,
            _ => Shape::OptionalOne,
        },
        _ => Shape::One,
    }
}

/// Splits `Wrapper<Inner>` for the wrappers relation fields understand.
fn wrapper(ty: &syn::Type) -> Option<(&'static str, &syn::Type)> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    let name = match segment.ident.to_string().as_str() {
        "Box" => "Box",
        "Vec" => "Vec",
        "Option" => "Option",
        _ => return None,
    };
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) => Some((name, inner)),
        _ => None,
    }
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    relation: bool,
    primary_key: bool,
    rename: Option<String>,
}

fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                result.skip = true;
            } else if meta.path.is_ident("relation") {
                result.relation = true;
            } else if meta.path.is_ident("primary_key") {
                result.primary_key = true;
            } else if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.rename = Some(value.value());
            } else {
                return Err(meta.error("unknown entity attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(ty: &str) -> Shape {
        relation_shape(&syn::parse_str(ty).unwrap())
    }

    #[test]
    fn relation_shapes() {
        assert_eq!(shape("Person"), Shape::One);
        assert_eq!(shape("Box<Person>"), Shape::Boxed);
        assert_eq!(shape("Vec<Wheel>"), Shape::Many);
        assert_eq!(shape("Option<Person>"), Shape::OptionalOne);
        assert_eq!(shape("Option<Box<Person>>"), Shape::OptionalBoxed);
        assert_eq!(shape("std::option::Option<Vec<Wheel>>"), Shape::OptionalMany);
    }

    #[test]
    fn field_attributes() {
        let input: syn::DeriveInput = syn::parse_quote! {
            struct Car {
                #[entity(primary_key, rename = "vin")]
                id: String,
                #[entity(skip)]
                cache: u8,
                #[entity(relation)]
                wheels: Vec<Wheel>,
            }
        };
        let fields = collect_fields(&input).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].key, "vin");
        assert!(fields[0].primary_key);
        assert_eq!(fields[1].shape, Some(Shape::Many));
    }

    #[test]
    fn rejects_unknown_attribute_and_tuple_structs() {
        let unknown: syn::DeriveInput = syn::parse_quote! {
            struct Car { #[entity(wheels)] id: u8 }
        };
        assert!(collect_fields(&unknown).is_err());

        let tuple: syn::DeriveInput = syn::parse_quote! { struct Car(u8); };
        assert!(collect_fields(&tuple).is_err());
    }
}
