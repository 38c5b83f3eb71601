//! Implementation of the `#[syscall]` attribute macro.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, FnArg, Ident, ItemFn, Pat, Type};

/// Rewrites a syscall handler of the form
///
/// ```ignore
/// #[syscall]
/// fn open(path: UserString, flags: i32) -> EResult<usize> { .. }
/// ```
///
/// into a function taking the raw six-register argument array, so it can be stored directly
/// in the dispatch table (see `src/syscall/mod.rs`).
pub fn syscall(item: TokenStream) -> TokenStream {
	let input = parse_macro_input!(item as ItemFn);

	if input.sig.inputs.len() > 6 {
		return syn::Error::new_spanned(&input.sig, "a syscall handler takes at most 6 arguments")
			.to_compile_error()
			.into();
	}

	let vis = &input.vis;
	let attrs = &input.attrs;
	let name = &input.sig.ident;
	let raw_name = format_ident!("{}_raw", name);
	let output = &input.sig.output;
	let block = &input.block;

	let mut bindings = Vec::new();
	let mut idents: Vec<Ident> = Vec::new();
	let mut tys: Vec<Type> = Vec::new();
	for (i, arg) in input.sig.inputs.iter().enumerate() {
		let FnArg::Typed(pat_ty) = arg else {
			return syn::Error::new_spanned(arg, "syscall handlers cannot take `self`")
				.to_compile_error()
				.into();
		};
		let Pat::Ident(pat_ident) = &*pat_ty.pat else {
			return syn::Error::new_spanned(&pat_ty.pat, "expected a plain identifier")
				.to_compile_error()
				.into();
		};
		let ident = pat_ident.ident.clone();
		let ty = (*pat_ty.ty).clone();
		bindings.push(quote! {
			let #ident = <#ty as crate::syscall::FromSyscallArg>::from_syscall_arg(regs[#i], false);
		});
		idents.push(ident);
		tys.push(ty);
	}

	let expanded = quote! {
		#(#attrs)*
		#vis fn #name(#(#idents: #tys),*) #output #block

		#(#attrs)*
		#vis fn #raw_name(regs: &[usize; 6]) -> crate::util::errno::EResult<usize> {
			#(#bindings)*
			#name(#(#idents),*)
		}
	};
	expanded.into()
}
