
use std::borrow::Cow;
use std::iter::ExactSizeIterator;
use std::io::Stdout;
use std::time::Duration;

use pbr::ProgressBar;

/// Wraps an iterator of known length with a terminal progress bar.
pub struct ReportingIterator<I>
  where I: ExactSizeIterator,
{
  name: Cow<'static, str>,
  progress: ProgressBar<Stdout>,
  inner: I,
  finished: bool,
}
impl<I> ReportingIterator<I>
  where I: ExactSizeIterator,
{
  pub fn new<N>(inner: I, name: N) -> ReportingIterator<I>
    where N: Into<Cow<'static, str>>,
  {
    let name = name.into();
    let mut p = ProgressBar::new(inner.len() as _);
    p.show_speed = true;
    p.show_percent = true;
    p.show_counter = true;
    p.show_time_left = true;

    let fps = Duration::new(1, 0) / 60;
    p.set_max_refresh_rate(Some(fps));

    let msg = format!("{}: ", name);
    p.message(&msg[..]);
    ReportingIterator {
      name,
      progress: p,
      inner,
      finished: false,
    }
  }
}

impl<I> Iterator for ReportingIterator<I>
  where I: ExactSizeIterator,
{
  type Item = I::Item;
  fn next(&mut self) -> Option<Self::Item> {
    match self.inner.next() {
      Some(v) => {
        self.progress.inc();
        Some(v)
      },
      None => {
        if !self.finished {
          self.finished = true;
          let msg = format!("{} done!\n", self.name);
          self.progress.finish_println(&msg);
        }
        None
      },
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) { self.inner.size_hint() }
}
impl<I> ExactSizeIterator for ReportingIterator<I>
  where I: ExactSizeIterator,
{ }

pub trait Reporting: ExactSizeIterator + Sized {
  fn reporting<N>(self, name: N) -> ReportingIterator<Self>
    where N: Into<Cow<'static, str>>,
  {
    ReportingIterator::new(self, name)
  }
}
impl<I> Reporting for I
  where I: ExactSizeIterator,
{ }
