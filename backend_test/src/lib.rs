use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that the database is dropped regardless of how the test terminates.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// [`mongodb::Database`], [`crate::store::MongoStore`],
/// [`crate::model::mongodb::Coll<T>`] and, when a role is given as the macro
/// argument (`admin`, `voter` or `auditor`), a [`rocket::http::Header`]
/// carrying a bearer token for a fresh user with that role.
///
/// These tests need a MongoDB replica set, so they are ignored unless the
/// `db_tests` feature is enabled.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let (injected, collection_idents, collection_types) = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test keeps its declared name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Work out which role, if any, to mint a token for.
    let role = parse_macro_input!(args as Option<Ident>);
    let role_variant = match role.as_ref().map(|r| r.to_string()).as_deref() {
        Some("admin") => Some(quote! { Admin }),
        Some("voter") => Some(quote! { Voter }),
        Some("auditor") => Some(quote! { Auditor }),
        Some(_) => {
            return syn::Error::new(
                role.span(),
                "Expected one of `admin`, `voter` or `auditor`",
            )
            .into_compile_error()
            .into();
        }
        None => None,
    };
    let wants_header = injected.iter().any(|i| matches!(i, Injected::Header));
    let make_header = match (role_variant, wants_header) {
        (Some(variant), _) => quote! {
            let config = rocket_client.rocket().state::<crate::config::Config>().unwrap();
            let auth_header = crate::model::auth::AuthToken::new(
                crate::model::mongodb::Id::new(),
                crate::model::auth::Role::#variant,
            )
            .into_header(config)
            .unwrap();
        },
        (None, true) => {
            return syn::Error::new(
                item_fn.sig.span(),
                "Injecting a `Header` needs a role, e.g. `#[backend_test(voter)]`",
            )
            .into_compile_error()
            .into();
        }
        (None, false) => quote! {
            let auth_header = ();
        },
    };
    let test_args = injected.iter().map(Injected::tokens).collect::<Vec<_>>();

    // Rewrite the test function.
    quote! {
        #[test]
        #[cfg_attr(not(feature = "db_tests"), ignore = "needs a MongoDB replica set")]
        fn #name() {
            /// Test setup.
            async fn setup() -> (rocket::local::asynchronous::Client, mongodb::Database) {
                let rocket_client = rocket::local::asynchronous::Client::tracked(crate::build())
                    .await
                    .unwrap();
                let db = rocket_client
                    .rocket()
                    .state::<mongodb::Database>()
                    .unwrap()
                    .clone();
                (rocket_client, db)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(db: mongodb::Database) {
                db.drop(None).await.unwrap();
            }

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
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let (rocket_client, db) = outer_runtime.block_on(setup());

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let client_mutex = std::sync::Mutex::new(rocket_client);
            let db_mutex = std::sync::Mutex::new(db.clone());
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                let rocket_client = client_mutex.into_inner().unwrap();
                let db = db_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();

                let store = rocket_client
                    .rocket()
                    .state::<crate::store::MongoStore>()
                    .unwrap()
                    .clone();
                #make_header

                #(
                    let #collection_idents = crate::model::mongodb::Coll::<#collection_types>::from_db(&db);
                )*

                runtime.block_on(#new_name(#(#test_args),* #(,#collection_idents)*));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(db));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// A non-collection dependency the test asks for.
enum Injected {
    Client,
    Database,
    Store,
    Header,
}

impl Injected {
    fn tokens(&self) -> TokenStream2 {
        match self {
            Self::Client => quote! { rocket_client },
            Self::Database => quote! { db },
            Self::Store => quote! { store },
            Self::Header => quote! { auth_header.clone() },
        }
    }

    fn from_type_ident(ident: &Ident) -> Option<Self> {
        if ident == "Client" {
            Some(Self::Client)
        } else if ident == "Database" {
            Some(Self::Database)
        } else if ident == "MongoStore" {
            Some(Self::Store)
        } else if ident == "Header" {
            Some(Self::Header)
        } else {
            None
        }
    }

    fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
#[allow(clippy::type_complexity)]
fn check_sig(sig: Signature) -> Result<(Vec<Injected>, Vec<Ident>, Vec<Ident>), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut injected: Vec<Injected> = vec![];
    let mut collection_idents = vec![];
    let mut collection_types = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Valid as the last path segment for any type is itself
                    let last = type_path.path.segments.last().unwrap();
                    if let Some(kind) = Injected::from_type_ident(&last.ident) {
                        if injected.iter().any(|i| i.same_kind(&kind)) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{}`", last.ident),
                            ));
                        }
                        injected.push(kind);
                        continue;
                    }
                    if last.ident == "Coll" {
                        if let PathArguments::AngleBracketed(generics) = &last.arguments {
                            if let Some(GenericArgument::Type(Type::Path(type_path))) =
                                generics.args.first()
                            {
                                if let Some(type_ident) = type_path.path.get_ident() {
                                    collection_idents.push(pat_ident.ident.clone());
                                    collection_types.push(type_ident.clone());
                                    continue;
                                }
                            }
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `Client`, `Database`, `MongoStore`, `Header` or `Coll<T>`",
        ));
    }

    Ok((injected, collection_idents, collection_types))
}
