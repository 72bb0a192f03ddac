use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that any test database is dropped regardless of how the test
/// terminates.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::store::MemoryStore`, `crate::store::MongoStore` and
/// `crate::model::mongodb::Coll<T>`. The client is always backed by the
/// injected `MemoryStore`; the MongoDB dependencies share one fresh database.
///
/// Attributes on the test, such as `#[ignore]`, are moved to the generated
/// `#[test]` function.
#[proc_macro_attribute]
pub fn backend_test(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let deps = match check_sig(item_fn.sig.clone()) {
        Ok(deps) => deps,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();
    let attrs = std::mem::take(&mut item_fn.attrs);

    let test_args = &deps.args;

    let client_setup = if deps.client {
        quote! {
            let rocket_client = outer_runtime.block_on(async {
                rocket::local::asynchronous::Client::tracked(crate::rocket_for_store(memory_store.clone()))
                    .await
                    .unwrap()
            });
        }
    } else {
        quote! {}
    };

    let (mongo_setup, mongo_cleanup) = if deps.mongo {
        (
            quote! {
                let mongo_store = outer_runtime.block_on(crate::test_mongo_store());
            },
            quote! {
                outer_runtime.block_on(async {
                    mongo_store.database().drop(None).await.unwrap();
                });
            },
        )
    } else {
        (quote! {}, quote! {})
    };

    // Rewrite the test function.
    quote! {
        #[test]
        #(#attrs)*
        fn #name() {
            /// The test itself.
            #item_fn

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            #[allow(unused_variables)]
            let memory_store = crate::store::MemoryStore::default();
            #mongo_setup
            #client_setup

            // Run the test, catching any panics. Everything the test touches
            // is either owned by it or dropped below.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                inner_runtime.block_on(#new_name(#(#test_args),*));
            }));

            // Run the cleanup.
            #mongo_cleanup

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::resume_unwind(cause);
            }
        }
    }
    .into()
}

/// What a test asked to have injected.
struct Dependencies {
    /// One expression per parameter, in order.
    args: Vec<TokenStream2>,
    client: bool,
    mongo: bool,
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Dependencies, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut deps = Dependencies {
        args: vec![],
        client: false,
        mongo: false,
    };

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // Valid as the last path segment for any type is itself
                let segment = type_path.path.segments.last().unwrap();
                if segment.ident == "Client" {
                    if deps.client {
                        return Err(syn::Error::new(
                            input.span(),
                            "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                        ));
                    }
                    deps.client = true;
                    deps.args.push(quote! { rocket_client });
                    continue;
                } else if segment.ident == "MemoryStore" {
                    deps.args.push(quote! { memory_store.clone() });
                    continue;
                } else if segment.ident == "MongoStore" {
                    deps.mongo = true;
                    deps.args.push(quote! { mongo_store.clone() });
                    continue;
                } else if segment.ident == "Coll" {
                    if let PathArguments::AngleBracketed(generics) = &segment.arguments {
                        if let Some(GenericArgument::Type(Type::Path(type_path))) =
                            generics.args.first()
                        {
                            if let Some(type_ident) = type_path.path.get_ident() {
                                deps.mongo = true;
                                deps.args.push(quote! {
                                    crate::model::mongodb::Coll::<#type_ident>::from_db(mongo_store.database())
                                });
                                continue;
                            }
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client: Client`, `store: MemoryStore`, `store: MongoStore` or `collection: Coll<T>`",
        ));
    }

    Ok(deps)
}
