use ncdeploy_error::io::{IoResult, IoError};

pub struct Template<'a> {
  pub data: &'a str,
}

impl<'a> Template<'a> {
  /// Compile a template with given object using liquid syntax
  pub fn compile(&self, obj: &dyn liquid::ObjectView) -> IoResult<String> {
    let template = liquid::ParserBuilder::with_stdlib()
      .build()
      .map_err(|err| IoError::invalid_data("Template parsing", err))?
      .parse(self.data)
      .map_err(|err| IoError::invalid_data("Template parsing", err))?;
    let output = template
      .render(obj)
      .map_err(|err| IoError::invalid_data("Template rendering", err))?;
    Ok(output)
  }
}

pub const HTTP_ONLY_TEMPLATE: &Template = &Template {
  data: include_str!("templates/http_only.conf"),
};

pub const HTTPS_TEMPLATE: &Template = &Template {
  data: include_str!("templates/https.conf"),
};

/// Minimal main config used to check a staged vhost on its own
pub const CHECK_TEMPLATE: &Template = &Template {
  data: include_str!("templates/check.conf"),
};
