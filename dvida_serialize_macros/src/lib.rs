use proc_macro::TokenStream;

extern crate proc_macro;

use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, parse_macro_input};

fn make_error(ident: &Ident, msg: &str) -> TokenStream {
    syn::Error::new_spanned(ident, msg).to_compile_error().into()
}

/// Derives both [`DvSerialize`] and [`DvDeserialize`] for a fixed-layout struct by
/// serializing/deserializing each named field in declaration order.
///
/// [`DvSerialize`]: dvida_serialize::DvSerialize
/// [`DvDeserialize`]: dvida_serialize::DvDeserialize
#[proc_macro_derive(DvDeSer)]
pub fn derive_dv_de_ser(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident,
        data,
        generics,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let data_struct = match data {
        Data::Struct(data_struct) => data_struct,
        _ => return make_error(&ident, "DvDeSer can only be derived for structs"),
    };

    let fields = match data_struct.fields {
        Fields::Named(named) => named.named,
        _ => return make_error(&ident, "DvDeSer requires named fields"),
    };

    let field_names: Vec<Ident> = fields.iter().map(|f| f.ident.clone().unwrap()).collect();
    let field_types: Vec<_> = fields.iter().map(|f| f.ty.clone()).collect();

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics dvida_serialize::DvSerialize for #ident #ty_generics #where_clause {
            fn serialize(
                &self,
                endianness: dvida_serialize::Endianness,
                target: &mut [u8],
            ) -> Result<usize, dvida_serialize::DvSerErr> {
                let mut acc: usize = 0;
                #(
                    acc += dvida_serialize::DvSerialize::serialize(&self.#field_names, endianness, &mut target[acc..])?;
                )*
                Ok(acc)
            }
        }

        impl #impl_generics dvida_serialize::DvDeserialize for #ident #ty_generics #where_clause {
            fn deserialize(
                endianness: dvida_serialize::Endianness,
                input: &[u8],
            ) -> Result<(Self, usize), dvida_serialize::DvDeErr> {
                let mut acc: usize = 0;
                #(
                    let (#field_names, size) =
                        <#field_types as dvida_serialize::DvDeserialize>::deserialize(endianness, &input[acc..])?;
                    acc += size;
                )*
                Ok((Self { #(#field_names),* }, acc))
            }
        }
    };

    expanded.into()
}
