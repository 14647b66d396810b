use serde::{Deserialize, Serialize};

/// Список параметров Стокса, хранимый в заголовке как строка через запятую
/// (например, `"I,Q,U,V"`).
///
/// Количество плоскостей изображения равно числу элементов списка. Пустая
/// строка даёт один безымянный параметр: так считает и исходный формат, и на
/// этом держится арифметика размера записи.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct StokesParams {
    names: Vec<String>,
}

impl StokesParams {
    /// Разбирает строку через запятую.
    pub fn parse(s: &str) -> Self {
        Self {
            names: s.split(',').map(|p| p.trim().to_string()).collect(),
        }
    }

    /// Строит список из отдельных имён.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Self::parse("");
        }

        Self { names }
    }

    /// Количество параметров (плоскостей изображения), всегда >= 1.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.iter().all(String::is_empty)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Строковое представление в том виде, в каком оно пишется на диск.
    pub fn joined(&self) -> String {
        self.names.join(",")
    }
}

impl Default for StokesParams {
    fn default() -> Self {
        Self::parse("I")
    }
}

impl std::fmt::Display for StokesParams {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.joined())
    }
}

impl std::str::FromStr for StokesParams {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for StokesParams {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&str> for StokesParams {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<StokesParams> for String {
    fn from(p: StokesParams) -> Self {
        p.joined()
    }
}
