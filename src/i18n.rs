//! Typed, locale-aware user messages.
//!
//! Lookup is a closed enumeration of keys resolved per locale through an
//! explicit context value that callers thread into rendering functions. An
//! unknown locale tag falls back to English up front, so resolution itself
//! can never miss.

/// Supported message locales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
  #[default]
  En,
  Es,
}

impl Locale {
  /// Parse a locale tag, falling back to English for anything unknown.
  pub fn parse(tag: &str) -> Locale {
    match tag.trim().to_ascii_lowercase().as_str() {
      "es" | "es-es" | "es-mx" => Locale::Es,
      _ => Locale::En,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Locale::En => "en",
      Locale::Es => "es",
    }
  }
}

/// Every user-facing message the client can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
  BackendReachable,
  BackendUnreachable,
  DeviceOnline,
  DeviceOffline,
  CreatedRemote,
  CreatedOffline,
  UpdatedRemote,
  UpdatedOffline,
  DeletedRemote,
  DeletedOffline,
  ListFromServer,
  ListFromStore,
  NoRecords,
}

/// Resolved once per invocation and passed explicitly to rendering code.
#[derive(Debug, Clone, Copy)]
pub struct LocaleContext {
  locale: Locale,
}

impl LocaleContext {
  pub fn new(locale: Locale) -> Self {
    Self { locale }
  }

  pub fn locale(&self) -> Locale {
    self.locale
  }

  pub fn text(&self, key: MessageKey) -> &'static str {
    use MessageKey::*;

    match key {
      BackendReachable => match self.locale {
        Locale::En => "backend: reachable",
        Locale::Es => "servidor: disponible",
      },
      BackendUnreachable => match self.locale {
        Locale::En => "backend: unreachable, working offline",
        Locale::Es => "servidor: no disponible, trabajando sin conexión",
      },
      DeviceOnline => match self.locale {
        Locale::En => "device: online",
        Locale::Es => "dispositivo: en línea",
      },
      DeviceOffline => match self.locale {
        Locale::En => "device: offline",
        Locale::Es => "dispositivo: sin conexión",
      },
      CreatedRemote => match self.locale {
        Locale::En => "brand registered",
        Locale::Es => "marca registrada",
      },
      CreatedOffline => match self.locale {
        Locale::En => "brand saved locally; it will sync when the backend returns",
        Locale::Es => "marca guardada localmente; se sincronizará cuando vuelva el servidor",
      },
      UpdatedRemote => match self.locale {
        Locale::En => "brand updated",
        Locale::Es => "marca actualizada",
      },
      UpdatedOffline => match self.locale {
        Locale::En => "brand updated locally; it will sync when the backend returns",
        Locale::Es => "marca actualizada localmente; se sincronizará cuando vuelva el servidor",
      },
      DeletedRemote => match self.locale {
        Locale::En => "brand deleted",
        Locale::Es => "marca eliminada",
      },
      DeletedOffline => match self.locale {
        Locale::En => "brand deleted locally; it will sync when the backend returns",
        Locale::Es => "marca eliminada localmente; se sincronizará cuando vuelva el servidor",
      },
      ListFromServer => match self.locale {
        Locale::En => "showing the server listing",
        Locale::Es => "mostrando el listado del servidor",
      },
      ListFromStore => match self.locale {
        Locale::En => "showing locally stored records",
        Locale::Es => "mostrando los registros guardados localmente",
      },
      NoRecords => match self.locale {
        Locale::En => "no brand records",
        Locale::Es => "no hay registros de marca",
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_unknown_locale_falls_back_to_english() {
    assert_eq!(Locale::parse("fr"), Locale::En);
    assert_eq!(Locale::parse(""), Locale::En);
    assert_eq!(Locale::parse("ES-MX"), Locale::Es);
  }

  #[test]
  fn test_lookup_is_per_locale() {
    let en = LocaleContext::new(Locale::En);
    let es = LocaleContext::new(Locale::Es);

    assert_eq!(en.text(MessageKey::NoRecords), "no brand records");
    assert_eq!(es.text(MessageKey::NoRecords), "no hay registros de marca");
    assert_ne!(
      en.text(MessageKey::CreatedOffline),
      es.text(MessageKey::CreatedOffline)
    );
  }
}
