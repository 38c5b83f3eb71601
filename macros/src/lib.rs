//! Derive and attribute macros for the `nucleus` kernel.

extern crate proc_macro;

mod syscall;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Marks a `#[repr(C)]` struct as safe to reinterpret from an arbitrary byte buffer (a disk
/// sector, a page of physical memory, ...).
///
/// This only emits a marker trait impl; it is on the caller to ensure the struct has no
/// padding-sensitive invariants and no padding bytes that matter, since the struct is read
/// directly out of untrusted storage.
#[proc_macro_derive(AnyRepr)]
pub fn derive_any_repr(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	let name = input.ident;
	let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
	quote! {
		unsafe impl #impl_generics crate::util::AnyRepr for #name #ty_generics #where_clause {}
	}
	.into()
}

/// Declares a system call handler.
///
/// The annotated function's arguments are pulled, in order, from the SysV syscall argument
/// registers (`rdi`, `rsi`, `rdx`, `r10`, `r8`, `r9`), each converted through
/// [`FromSyscallArg`](crate::syscall::FromSyscallArg). The macro only rewrites the argument
/// list; it does not touch the function body.
#[proc_macro_attribute]
pub fn syscall(_attr: TokenStream, item: TokenStream) -> TokenStream {
	syscall::syscall(item)
}
