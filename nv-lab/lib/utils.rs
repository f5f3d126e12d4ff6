//! Miscellaneous output and convenience macros.

/// Create a directory (and all of its parents) if it doesn't already exist.
///
/// Expands to an expression using `?`, so it must be called from a function
/// returning a `Result` whose error type implements
/// `From<`[`nv_lab::error::Error`][crate::error::Error]`>`.
#[macro_export]
macro_rules! mkdir {
    ( $dir:expr ) => {
        {
            let dir = std::path::PathBuf::from(&$dir);
            if !dir.is_dir() {
                std::fs::create_dir_all(&dir)
                    .map_err($crate::error::Error::from)?;
            }
        }
    }
}

/// Write a collection of named arrays to a `.npz` archive.
///
/// ```ignore
/// write_npz!(
///     outdir.join("data.npz"),
///     arrays: {
///         "time" => &time,
///         "rho" => &rho,
///     }
/// );
/// ```
///
/// Like [`mkdir!`], this expands to an expression using `?`.
#[macro_export]
macro_rules! write_npz {
    (
        $outfile:expr,
        arrays: { $( $name:expr => $arr:expr ),+ $(,)? } $(,)?
    ) => {
        {
            let file = std::fs::File::create($outfile)
                .map_err($crate::error::Error::from)?;
            let mut data = $crate::npy::NpzWriter::new(file);
            $(
                data.add_array($name, $arr)
                    .map_err($crate::error::Error::from)?;
            )+
            data.finish().map_err($crate::error::Error::from)?;
        }
    }
}

/// Call `print!` and immediately flush.
#[macro_export]
macro_rules! print_flush {
    ( $fmt:literal $(, $val:expr )* $(,)? ) => {
        {
            print!($fmt $(, $val )*);
            std::io::Write::flush(&mut std::io::stdout()).ok();
        }
    }
}

/// Call `println!` and immediately flush.
#[macro_export]
macro_rules! println_flush {
    ( $fmt:literal $(, $val:expr )* $(,)? ) => {
        {
            println!($fmt $(, $val )*);
            std::io::Write::flush(&mut std::io::stdout()).ok();
        }
    }
}

/// Shorthand for a `Complex64` literal.
///
/// `c!(re)` creates a purely real number, and `c!(re, im)` a general one.
#[macro_export]
macro_rules! c {
    ( $re:expr ) => { $crate::num_complex::Complex64::new($re as f64, 0.0) };
    ( $re:expr, $im:expr ) => {
        $crate::num_complex::Complex64::new($re as f64, $im as f64)
    };
}

/// Find the extrema of a collection of floating-point numbers, ignoring NaNs.
pub trait FExtremum: IntoIterator<Item = f64> + Sized {
    /// Return the largest element, if any.
    fn fmax(self) -> Option<f64> {
        self.into_iter()
            .filter(|x| !x.is_nan())
            .fold(None, |acc, x| Some(acc.map_or(x, |m: f64| m.max(x))))
    }

    /// Return the smallest element, if any.
    fn fmin(self) -> Option<f64> {
        self.into_iter()
            .filter(|x| !x.is_nan())
            .fold(None, |acc, x| Some(acc.map_or(x, |m: f64| m.min(x))))
    }

    /// Return the index and value of the first largest element, if any.
    fn fargmax(self) -> Option<(usize, f64)> {
        self.into_iter()
            .enumerate()
            .filter(|(_, x)| !x.is_nan())
            .fold(None, |acc, (k, x)| {
                match acc {
                    Some((_, m)) if x <= m => acc,
                    _ => Some((k, x)),
                }
            })
    }
}

impl<I> FExtremum for I
where I: IntoIterator<Item = f64>
{ }
