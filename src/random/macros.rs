/// Defines a unique type used as a key to retrieve an independent random stream from an
/// [`RngSource`](crate::random::RngSource).
///
/// ```
/// use ixa_outbreak::define_rng;
/// use ixa_outbreak::random::RngSource;
///
/// define_rng!(WeatherRng);
///
/// let source = RngSource::new(3);
/// let rainy = source.sample_bool(WeatherRng, 0.25);
/// # let _ = rainy;
/// ```
#[macro_export]
macro_rules! define_rng {
    ($vis:vis $random_id:ident) => {
        #[derive(Copy, Clone)]
        $vis struct $random_id;

        impl $crate::random::RngId for $random_id {
            type RngType = $crate::rand::rngs::SmallRng;

            fn get_name() -> &'static str {
                stringify!($random_id)
            }
        }

        // Two streams with the same name would share a seed.
        $crate::paste::paste! {
            #[doc(hidden)]
            #[no_mangle]
            #[allow(non_upper_case_globals)]
            pub static [<outbreak_rng_name_guard_ $random_id>]: () = ();
        }
    };
}
pub use define_rng;
