// streams/src/source.rs

//! Pull-based element sources.
//!
//! A source is asked for one element at a time and answers with an element,
//! with `Ok(None)` once it is exhausted, or with an error. Exhaustion ends a
//! subscription with `on_complete`, an error ends it with `on_error`.

use std::io::BufRead;

use flow_base::BoxError;

/// Something a [`PumpingSubscription`](crate::PumpingSubscription) can pull
/// elements from.
///
/// Each subscription owns its source exclusively and calls it from inside
/// its run loop only, so implementations need no synchronization.
pub trait ElementSource<T>: Send + 'static {
  fn next_element(&mut self) -> Result<Option<T>, BoxError>;
}

impl<T: 'static> ElementSource<T> for Box<dyn ElementSource<T>> {
  fn next_element(&mut self) -> Result<Option<T>, BoxError> {
    (**self).next_element()
  }
}

/// Yields the items of an iterator. Never fails.
#[derive(Debug, Clone)]
pub struct IterSource<I> {
  iter: I,
}

impl<I> ElementSource<I::Item> for IterSource<I>
where
  I: Iterator + Send + 'static,
{
  fn next_element(&mut self) -> Result<Option<I::Item>, BoxError> {
    Ok(self.iter.next())
  }
}

pub fn from_iter<I>(iter: I) -> IterSource<I::IntoIter>
where
  I: IntoIterator,
  I::IntoIter: Send + 'static,
{
  IterSource {
    iter: iter.into_iter(),
  }
}

/// Yields the `Ok` items of an iterator; the first `Err` is a source failure.
#[derive(Debug, Clone)]
pub struct ResultsSource<I> {
  iter: I,
}

impl<I, T, E> ElementSource<T> for ResultsSource<I>
where
  I: Iterator<Item = Result<T, E>> + Send + 'static,
  E: Into<BoxError>,
{
  fn next_element(&mut self) -> Result<Option<T>, BoxError> {
    match self.iter.next() {
      None => Ok(None),
      Some(Ok(element)) => Ok(Some(element)),
      Some(Err(error)) => Err(error.into()),
    }
  }
}

pub fn from_results<I>(iter: I) -> ResultsSource<I::IntoIter>
where
  I: IntoIterator,
  I::IntoIter: Send + 'static,
{
  ResultsSource {
    iter: iter.into_iter(),
  }
}

/// Calls a closure for every element.
pub struct FromFn<F> {
  f: F,
}

impl<F, T, E> ElementSource<T> for FromFn<F>
where
  F: FnMut() -> Result<Option<T>, E> + Send + 'static,
  E: Into<BoxError>,
{
  fn next_element(&mut self) -> Result<Option<T>, BoxError> {
    (self.f)().map_err(Into::into)
  }
}

pub fn from_fn<F>(f: F) -> FromFn<F> {
  FromFn { f }
}

/// Yields clones of one value forever.
#[derive(Debug, Clone)]
pub struct Repeat<T> {
  value: T,
}

impl<T: Clone + Send + 'static> ElementSource<T> for Repeat<T> {
  fn next_element(&mut self) -> Result<Option<T>, BoxError> {
    Ok(Some(self.value.clone()))
  }
}

pub fn repeat<T: Clone + Send + 'static>(value: T) -> Repeat<T> {
  Repeat { value }
}

/// Yields the lines of a reader without their `\n` or `\r\n` terminator.
///
/// Reads block the run loop; pair with a runner that tolerates blocking work.
#[derive(Debug)]
pub struct Lines<R> {
  reader: R,
}

impl<R: BufRead + Send + 'static> ElementSource<String> for Lines<R> {
  fn next_element(&mut self) -> Result<Option<String>, BoxError> {
    let mut line = String::new();
    if self.reader.read_line(&mut line)? == 0 {
      return Ok(None);
    }
    if line.ends_with('\n') {
      line.pop();
      if line.ends_with('\r') {
        line.pop();
      }
    }
    Ok(Some(line))
  }
}

pub fn lines<R: BufRead + Send + 'static>(reader: R) -> Lines<R> {
  Lines { reader }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::{self, Cursor, Read};

  fn drain<T, S: ElementSource<T>>(source: &mut S) -> (Vec<T>, Option<String>) {
    let mut out = Vec::new();
    loop {
      match source.next_element() {
        Ok(Some(element)) => out.push(element),
        Ok(None) => return (out, None),
        Err(error) => return (out, Some(error.to_string())),
      }
    }
  }

  #[test]
  fn iter_source_ends_with_exhaustion() {
    let (items, error) = drain(&mut from_iter(vec![1, 2, 3]));
    assert_eq!(items, vec![1, 2, 3]);
    assert_eq!(error, None);
  }

  #[test]
  fn results_source_stops_at_first_error() {
    let results: Vec<Result<u32, String>> = vec![Ok(1), Ok(2), Err("bad read".into()), Ok(4)];
    let (items, error) = drain(&mut from_results(results));
    assert_eq!(items, vec![1, 2]);
    assert_eq!(error.as_deref(), Some("bad read"));
  }

  #[test]
  fn fn_source_counts_down() {
    let mut left = 3;
    let mut source = from_fn(move || -> Result<Option<u32>, io::Error> {
      if left == 0 {
        return Ok(None);
      }
      left -= 1;
      Ok(Some(left))
    });
    let (items, error) = drain(&mut source);
    assert_eq!(items, vec![2, 1, 0]);
    assert_eq!(error, None);
  }

  #[test]
  fn repeat_never_ends() {
    let mut source = repeat("x");
    for _ in 0..100 {
      assert_eq!(source.next_element().unwrap(), Some("x"));
    }
  }

  #[test]
  fn lines_strip_terminators() {
    let input = Cursor::new("alpha\nbeta\r\n\ngamma");
    let (items, error) = drain(&mut lines(input));
    assert_eq!(items, vec!["alpha", "beta", "", "gamma"]);
    assert_eq!(error, None);
  }

  #[test]
  fn lines_report_read_errors() {
    struct Broken;
    impl Read for Broken {
      fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
      }
    }

    let (items, error) = drain(&mut lines(io::BufReader::new(Broken)));
    assert!(items.is_empty());
    assert_eq!(error.as_deref(), Some("pipe closed"));
  }

  #[test]
  fn boxed_sources_are_sources() {
    let mut boxed: Box<dyn ElementSource<u8>> = Box::new(from_iter([7u8]));
    assert_eq!(boxed.next_element().unwrap(), Some(7));
    assert_eq!(boxed.next_element().unwrap(), None);
  }
}
