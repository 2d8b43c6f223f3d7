extern crate proc_macro;

use crate::proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataStruct, DeriveInput};

#[proc_macro_derive(Inherit)]
pub fn inherit_derive(input: TokenStream) -> TokenStream {
    let ast = match syn::parse::<DeriveInput>(input) {
        Ok(ast) => ast,
        Err(e) => return e.to_compile_error().into(),
    };
    impl_inherit(&ast)
}

fn impl_inherit(ast: &DeriveInput) -> TokenStream {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let mut field_tokens = proc_macro2::TokenStream::new();
    if let Data::Struct(DataStruct { fields, .. }) = &ast.data {
        for field in fields.iter() {
            if let Some(name) = &field.ident {
                let field_token = quote! {
                    #name: ::inherit::Inherit::inherit_from(self.#name, other.#name),
                };
                field_tokens.extend(field_token);
            } else {
                return syn::Error::new_spanned(field, "Unnamed fields are not supported")
                    .to_compile_error()
                    .into();
            }
        }
    } else {
        return syn::Error::new_spanned(name, "Only struct types are supported")
            .to_compile_error()
            .into();
    }

    let gen = quote! {
        impl #impl_generics ::inherit::Inherit for #name #ty_generics #where_clause {
            fn inherit_from(self, other: Self) -> Self {
                Self {
                    #field_tokens
                }
            }
        }
    };
    gen.into()
}
