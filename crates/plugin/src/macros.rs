/// Export a module declaration under the [`DECLARATION_SYMBOL`](crate::DECLARATION_SYMBOL)
/// symbol of a `cdylib`.
///
/// ```ignore
/// portico_plugin::export_module! {
///     name: "orders",
///     entry: Program,
///     definitions: [OrderEndpoints, OrderSwaggerDoc],
/// }
/// ```
///
/// Only one module may be exported per library.
#[macro_export]
macro_rules! export_module {
    (
        name: $name:expr,
        entry: $entry:ident,
        definitions: [$($def:ident),* $(,)?]
        $(, opaque: [$($opaque:ident => $kind:ident),* $(,)?])?
        $(,)?
    ) => {
        #[unsafe(no_mangle)]
        pub static PORTICO_MODULE: $crate::ModuleDeclaration = $crate::ModuleDeclaration::new(
            $name,
            $crate::__portico_exports!(
                [$entry] [$($def),*] [$($($opaque => $kind),*)?]
            ),
        );
    };
}

/// Declare a module that is compiled into the host instead of loaded from disk.
///
/// ```ignore
/// portico_plugin::declare_module! {
///     pub static HOST_MODULE = {
///         name: "host",
///         entry: Program,
///         definitions: [HostEndpoints],
///     };
/// }
/// ```
#[macro_export]
macro_rules! declare_module {
    (
        $vis:vis static $ident:ident = {
            name: $name:expr,
            entry: $entry:ident,
            definitions: [$($def:ident),* $(,)?]
            $(, opaque: [$($opaque:ident => $kind:ident),* $(,)?])?
            $(,)?
        };
    ) => {
        $vis static $ident: $crate::ModuleDeclaration = $crate::ModuleDeclaration::new(
            $name,
            $crate::__portico_exports!(
                [$entry] [$($def),*] [$($($opaque => $kind),*)?]
            ),
        );
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __portico_exports {
    ([$entry:ident] [$($def:ident),*] [$($opaque:ident => $kind:ident),*]) => {{
        const EXPORTS: &[$crate::ExportedType] = &[
            $crate::ExportedType::marker(stringify!($entry)),
            $($crate::ExportedType::definition::<$def>(stringify!($def)),)*
            $($crate::ExportedType::opaque(stringify!($opaque), $crate::TypeKind::$kind),)*
        ];
        EXPORTS
    }};
}
