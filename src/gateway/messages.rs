//! 面向用户的本地化文案（en / es / pt / fr / de / it / ca，缺省回退英文）

/// 支持的语言代码
pub const SUPPORTED_LANGS: &[&str] = &["en", "es", "pt", "fr", "de", "it", "ca"];

/// 规整客户端传入的语言；不支持时返回 default
pub fn normalize_lang<'a>(raw: Option<&str>, default: &'a str) -> &'a str {
    let code = raw
        .map(|l| l.trim().to_lowercase())
        .map(|l| l.split(['-', '_']).next().unwrap_or_default().to_string())
        .unwrap_or_default();
    SUPPORTED_LANGS
        .iter()
        .copied()
        .find(|l| *l == code)
        .unwrap_or(default)
}

/// 语言代码 → 指令中使用的语言名称
pub fn lang_name(lang: &str) -> &'static str {
    match lang {
        "es" => "Spanish",
        "pt" => "Portuguese",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "ca" => "Catalan",
        _ => "English",
    }
}

pub fn welcome(lang: &str) -> &'static str {
    match lang {
        "es" => "¡Hola! Soy tu asistente. Puedo ayudarte con reservas, alojamientos, incidencias y preguntas generales. ¿En qué puedo ayudarte?",
        "pt" => "Olá! Sou o seu assistente. Posso ajudar com reservas, alojamentos, incidentes e perguntas gerais. Como posso ajudar?",
        "fr" => "Bonjour ! Je suis votre assistant. Je peux vous aider avec vos réservations, logements, incidents et questions générales. Comment puis-je vous aider ?",
        "de" => "Hallo! Ich bin Ihr Assistent. Ich helfe bei Buchungen, Unterkünften, Störungen und allgemeinen Fragen. Wie kann ich helfen?",
        "it" => "Ciao! Sono il tuo assistente. Posso aiutarti con prenotazioni, alloggi, problemi e domande generali. Come posso aiutarti?",
        "ca" => "Hola! Soc el teu assistent. Et puc ajudar amb reserves, allotjaments, incidències i preguntes generals. En què et puc ajudar?",
        _ => "Hello! I'm your assistant. I can help with bookings, accommodations, incidents and general questions. How can I help you?",
    }
}

pub fn rate_limited(lang: &str) -> &'static str {
    match lang {
        "es" => "El servicio está recibiendo muchas solicitudes. Espera unos segundos y vuelve a intentarlo.",
        "pt" => "O serviço está a receber muitos pedidos. Aguarde alguns segundos e tente novamente.",
        "fr" => "Le service reçoit trop de demandes. Patientez quelques secondes puis réessayez.",
        "de" => "Der Dienst erhält gerade sehr viele Anfragen. Bitte warten Sie einige Sekunden und versuchen Sie es erneut.",
        "it" => "Il servizio sta ricevendo molte richieste. Attendi qualche secondo e riprova.",
        "ca" => "El servei està rebent moltes sol·licituds. Espera uns segons i torna-ho a provar.",
        _ => "The service is receiving too many requests right now. Please wait a few seconds and try again.",
    }
}

pub fn backend_error(lang: &str) -> &'static str {
    match lang {
        "es" => "Lo siento, ha ocurrido un error al procesar tu mensaje. Inténtalo de nuevo.",
        "pt" => "Desculpe, ocorreu um erro ao processar a sua mensagem. Tente novamente.",
        "fr" => "Désolé, une erreur s'est produite lors du traitement de votre message. Veuillez réessayer.",
        "de" => "Entschuldigung, bei der Verarbeitung Ihrer Nachricht ist ein Fehler aufgetreten. Bitte versuchen Sie es erneut.",
        "it" => "Spiacente, si è verificato un errore durante l'elaborazione del messaggio. Riprova.",
        "ca" => "Ho sento, s'ha produït un error en processar el teu missatge. Torna-ho a provar.",
        _ => "Sorry, something went wrong while processing your message. Please try again.",
    }
}

pub fn round_budget(lang: &str) -> &'static str {
    match lang {
        "es" => "Lo siento, no he podido completar tu solicitud. ¿Puedes reformularla?",
        "pt" => "Desculpe, não consegui concluir o seu pedido. Pode reformulá-lo?",
        "fr" => "Désolé, je n'ai pas pu traiter votre demande. Pouvez-vous la reformuler ?",
        "de" => "Entschuldigung, ich konnte Ihre Anfrage nicht abschließen. Können Sie sie anders formulieren?",
        "it" => "Spiacente, non sono riuscito a completare la richiesta. Puoi riformularla?",
        "ca" => "Ho sento, no he pogut completar la teva sol·licitud. La pots reformular?",
        _ => "Sorry, I could not complete your request. Could you rephrase it?",
    }
}

pub fn no_response(lang: &str) -> &'static str {
    match lang {
        "es" => "No he podido generar una respuesta. ¿Puedes darme más detalles?",
        "pt" => "Não consegui gerar uma resposta. Pode dar-me mais detalhes?",
        "fr" => "Je n'ai pas pu générer de réponse. Pouvez-vous donner plus de détails ?",
        "de" => "Ich konnte keine Antwort erzeugen. Können Sie mehr Details nennen?",
        "it" => "Non sono riuscito a generare una risposta. Puoi darmi più dettagli?",
        "ca" => "No he pogut generar una resposta. Em pots donar més detalls?",
        _ => "I could not generate a response. Could you give me more details?",
    }
}

pub fn internal_error(lang: &str) -> &'static str {
    match lang {
        "es" => "Se ha producido un error interno. Inténtalo más tarde.",
        "pt" => "Ocorreu um erro interno. Tente mais tarde.",
        "fr" => "Une erreur interne s'est produite. Réessayez plus tard.",
        "de" => "Ein interner Fehler ist aufgetreten. Bitte versuchen Sie es später erneut.",
        "it" => "Si è verificato un errore interno. Riprova più tardi.",
        "ca" => "S'ha produït un error intern. Torna-ho a provar més tard.",
        _ => "An internal error occurred. Please try again later.",
    }
}
